use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};

use crate::{
    cache::PATHWAYS_KEY,
    mail::{Notification, templates::ModuleSubmitted},
    model::{
        CrudRepository, ModelManager, ResourceTyped,
        entity::{
            Achievement, AchievementStatusRow, EarnedAchievementRow, EmailLinks, LearningStreak,
            Module, ModuleCompletion, Pathway, UserEntity, UserProgress, UserProgressUpdate,
        },
    },
    progress::{
        streak::StreakState,
        tracker::{self, ModuleCompletionOutcome, ProgressChange, ProgressSummary},
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::progress::{
            CompleteModuleRequest, CompletionsQuery, DashboardResponse, ModuleStatus,
            PathwayDetailResponse, StartPathwayRequest,
        },
        error::ErrorResponse,
        middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/pathways", get(progress_pathways_handler))
        .route("/pathways/{id}", get(progress_pathway_detail_handler))
        .route("/user/summary", get(progress_summary_handler))
        .route("/user/dashboard", get(progress_dashboard_handler))
        .route("/user/start-pathway", post(progress_start_pathway_handler))
        .route("/user/pathway/{id}", put(progress_update_handler))
        .route("/modules/complete", post(progress_complete_module_handler))
        .route("/modules/completions", get(progress_completions_handler))
        .route("/achievements", get(progress_achievements_handler))
        .route("/achievements/user", get(progress_user_achievements_handler))
        .route("/streak", get(progress_streak_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn progress_fetch_error(e: crate::model::DatabaseError) -> WebError {
    WebError::resource_fetch_error(UserProgress::get_resource_type(), e)
}

async fn acquire(mm: &ModelManager) -> WebResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
    mm.executor()
        .acquire()
        .await
        .map_err(|e| progress_fetch_error(e.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/pathways",
    responses(
        (status = 200, description = "Pathway catalog", body = Vec<Pathway>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_pathways_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?;

    if let Some(cached) = state.cache().get_json::<Vec<Pathway>>(PATHWAYS_KEY).await {
        return Ok((StatusCode::OK, Json(cached)));
    }

    let pathways = Pathway::list_all(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(Pathway::get_resource_type(), e))?;
    state
        .cache()
        .set_json(PATHWAYS_KEY, &pathways, state.cache().default_ttl_secs())
        .await;

    Ok((StatusCode::OK, Json(pathways)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/pathways/{id}",
    params(("id" = String, Path, description = "Pathway id")),
    description = "Pathway with the caller's progress, module completion flags and the next module. Creates the progress row on first view",
    responses(
        (status = 200, description = "Pathway detail", body = PathwayDetailResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Pathway not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_pathway_detail_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mm = state.pool();

    let pathway = Pathway::find_by_id(mm, user, id.clone())
        .await
        .map_err(|e| WebError::resource_fetch_error(Pathway::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(Pathway::get_resource_type()))?;

    let mut conn = acquire(mm).await?;
    let progress = UserProgress::ensure(&mut conn, user.user_id(), &id)
        .await
        .map_err(progress_fetch_error)?;
    drop(conn);

    let modules = Module::list_by_pathway(mm, &id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Module::get_resource_type(), e))?;
    let completed = ModuleCompletion::list_for_user(mm, user.user_id(), Some(&id))
        .await
        .map_err(|e| WebError::resource_fetch_error(ModuleCompletion::get_resource_type(), e))?;
    let next_module = Module::next_incomplete(mm, user.user_id(), &id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Module::get_resource_type(), e))?;

    let modules = modules
        .into_iter()
        .map(|module| ModuleStatus {
            completed: completed.iter().any(|c| c.module_id() == module.id()),
            module,
        })
        .collect();

    Ok((
        StatusCode::OK,
        Json(PathwayDetailResponse {
            pathway,
            progress,
            modules,
            next_module,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/user/summary",
    responses(
        (status = 200, description = "Progress counters", body = ProgressSummary),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_summary_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let summary = tracker::summary(state.pool(), user.user_id()).await?;
    Ok((StatusCode::OK, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/user/dashboard",
    responses(
        (status = 200, description = "Pathway progress, counters, recent achievements and streak", body = DashboardResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_dashboard_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let summary = tracker::summary(state.pool(), user.user_id()).await?;

    let mut conn = acquire(state.pool()).await?;
    let pathways = UserProgress::list_for_user(&mut conn, user.user_id())
        .await
        .map_err(progress_fetch_error)?;
    let recent_achievements = Achievement::list_earned(&mut conn, user.user_id(), Some(5))
        .await
        .map_err(|e| WebError::resource_fetch_error(Achievement::get_resource_type(), e))?;
    let streak = LearningStreak::find(&mut conn, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(LearningStreak::get_resource_type(), e))?
        .map(|s| s.state())
        .unwrap_or_default();

    Ok((
        StatusCode::OK,
        Json(DashboardResponse {
            pathways,
            summary,
            recent_achievements,
            streak,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/progress/user/start-pathway",
    request_body = StartPathwayRequest,
    responses(
        (status = 200, description = "Progress row (existing or new)", body = ProgressChange),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Pathway not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_start_pathway_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<StartPathwayRequest>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let change = tracker::start_pathway(state.pool(), user.user_id(), &payload.pathway_id).await?;
    Ok((StatusCode::OK, Json(change)))
}

#[utoipa::path(
    put,
    path = "/api/v1/progress/user/pathway/{id}",
    params(("id" = String, Path, description = "Pathway id")),
    request_body = UserProgressUpdate,
    responses(
        (status = 200, description = "Updated progress", body = ProgressChange),
        (status = 400, description = "Values out of range", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Pathway not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UserProgressUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    if payload
        .progress_percentage
        .is_some_and(|p| !(0..=100).contains(&p))
    {
        return Err(WebError::user_bad_request(
            "progress_percentage must be between 0 and 100",
        ));
    }
    if payload.completed_modules.is_some_and(|v| v < 0)
        || payload.total_time_spent_minutes.is_some_and(|v| v < 0)
    {
        return Err(WebError::user_bad_request("counters must not be negative"));
    }

    let change = tracker::update_progress(state.pool(), user.user_id(), &id, &payload).await?;
    Ok((StatusCode::OK, Json(change)))
}

/// Tells the admins a module is waiting for review. Never fails the request.
async fn notify_module_submitted(
    state: &AppState,
    user: &AuthenticatedUser,
    outcome: &ModuleCompletionOutcome,
) {
    if !state.mailer().is_enabled() {
        return;
    }

    let mm = state.pool();
    let admin = AuthenticatedUser::admin();
    let completion = &outcome.completion;
    let loaded = async {
        let student = UserEntity::find_by_id(mm, &admin, user.user_id()).await?;
        let module = Module::find_by_id(mm, &admin, completion.module_id().to_string()).await?;
        let pathway = Pathway::find_by_id(mm, &admin, completion.pathway_id().to_string()).await?;
        Ok::<_, crate::model::DatabaseError>((student, module, pathway))
    }
    .await;

    let (Some(student), Some(module), Some(pathway)) = (match loaded {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("unable to load module submission details: {}", e);
            return;
        }
    }) else {
        return;
    };

    state.mailer().dispatch(
        mm,
        Notification::ModuleSubmitted {
            context: ModuleSubmitted {
                student_name: student.full_name().to_string(),
                student_email: student.email().to_string(),
                module_title: module.title().to_string(),
                pathway_title: pathway.title().to_string(),
                time_spent_minutes: completion.time_spent_minutes(),
                review_url: format!("{}/admin", state.config().host().public_url()),
            },
            links: EmailLinks {
                recipient_user_id: None,
                module_id: Some(module.id().to_string()),
                pathway_id: Some(pathway.id().to_string()),
                resource_submission_id: None,
                module_completion_id: Some(completion.id()),
            },
        },
    );
}

#[utoipa::path(
    post,
    path = "/api/v1/progress/modules/complete",
    request_body = CompleteModuleRequest,
    description = "Completes a module once every resource in it is done. Updates pathway progress, streak and achievements atomically",
    responses(
        (status = 200, description = "Module completed", body = ModuleCompletionOutcome),
        (status = 400, description = "Incomplete resources or module outside the pathway", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Module or pathway not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_complete_module_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<CompleteModuleRequest>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if payload.time_spent_minutes < 0 {
        return Err(WebError::user_bad_request(
            "time_spent_minutes must not be negative",
        ));
    }

    let outcome = tracker::complete_module(
        state.pool(),
        user.user_id(),
        &payload.pathway_id,
        &payload.module_id,
        payload.time_spent_minutes,
    )
    .await?;

    if outcome.newly_completed {
        notify_module_submitted(&state, user, &outcome).await;
    }

    Ok((StatusCode::OK, Json(outcome)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/modules/completions",
    params(CompletionsQuery),
    responses(
        (status = 200, description = "Completed modules", body = Vec<ModuleCompletion>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_completions_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<CompletionsQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let completions =
        ModuleCompletion::list_for_user(state.pool(), user.user_id(), query.pathway_id.as_deref())
            .await
            .map_err(|e| {
                WebError::resource_fetch_error(ModuleCompletion::get_resource_type(), e)
            })?;
    Ok((StatusCode::OK, Json(completions)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/achievements",
    responses(
        (status = 200, description = "Achievement catalog with earned flags", body = Vec<AchievementStatusRow>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_achievements_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let achievements = Achievement::list_with_status(state.pool(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Achievement::get_resource_type(), e))?;
    Ok((StatusCode::OK, Json(achievements)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/achievements/user",
    responses(
        (status = 200, description = "Earned achievements, newest first", body = Vec<EarnedAchievementRow>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_user_achievements_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mut conn = acquire(state.pool()).await?;
    let earned = Achievement::list_earned(&mut conn, user.user_id(), None)
        .await
        .map_err(|e| WebError::resource_fetch_error(Achievement::get_resource_type(), e))?;
    Ok((StatusCode::OK, Json(earned)))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/streak",
    responses(
        (status = 200, description = "Current streak, zeros when none", body = StreakState),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn progress_streak_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mut conn = acquire(state.pool()).await?;
    let streak: StreakState = LearningStreak::find(&mut conn, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(LearningStreak::get_resource_type(), e))?
        .map(|s| s.state())
        .unwrap_or_default();
    Ok((StatusCode::OK, Json(streak)))
}

