//! Staff review of uploaded work and completed modules.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    mail::{
        Notification,
        templates::{ModuleReviewed, SubmissionReviewed},
    },
    model::{
        CrudRepository, DatabaseError, ResourceTyped,
        entity::{
            APPROVAL_STATUSES, EmailLinks, GRADES, Module, ModuleCompletion, Pathway,
            PendingModuleCompletionRow, PendingSubmissionRow, REVIEW_STATUSES, Resource,
            ResourceCompletion, Submission, UserEntity,
        },
    },
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::resources::{ModuleReviewRequest, PendingQuery, SubmissionReviewRequest},
        error::ErrorResponse,
        middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/submissions/pending", get(pending_submissions_handler))
        .route("/submissions/{id}/review", post(review_submission_handler))
        .route(
            "/module-completions/pending",
            get(pending_module_completions_handler),
        )
        .route(
            "/module-completions/{id}/review",
            post(review_module_completion_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn submission_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(Submission::get_resource_type(), e)
}

fn completion_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(ModuleCompletion::get_resource_type(), e)
}

fn dashboard_url(state: &AppState) -> String {
    format!("{}/dashboard", state.config().host().frontend_url())
}

/// Approved defaults to `pass`, rejected to `fail`.
fn resolve_grade(status: &str, grade: Option<&str>) -> WebResult<String> {
    if !REVIEW_STATUSES.contains(&status) {
        return Err(WebError::user_bad_request(format!(
            "submission_status must be one of: {}",
            REVIEW_STATUSES.join(", ")
        )));
    }
    let grade = grade.unwrap_or(if status == "approved" { "pass" } else { "fail" });
    if !GRADES.contains(&grade) {
        return Err(WebError::user_bad_request(format!(
            "grade must be one of: {}",
            GRADES.join(", ")
        )));
    }
    Ok(grade.to_string())
}

/// Records a submission review and emails the student. Shared with the admin dashboard.
pub(super) async fn review_submission(
    state: &AppState,
    reviewer: &AuthenticatedUser,
    id: Uuid,
    request: &SubmissionReviewRequest,
) -> WebResult<Submission> {
    reviewer.require_staff()?;
    let grade = resolve_grade(&request.submission_status, request.grade.as_deref())?;
    let mm = state.pool();

    let submission = Submission::find_by_id(mm, id)
        .await
        .map_err(submission_error)?
        .filter(|s| !s.is_deleted())
        .ok_or_else(|| WebError::resource_not_found(Submission::get_resource_type()))?;

    let recorded = async {
        let mut tx = mm.begin().await?;
        let reviewed = submission
            .review(
                &mut tx,
                reviewer.user_id(),
                &request.submission_status,
                &grade,
                request.review_comments.as_deref(),
            )
            .await?;
        if reviewed.submission_status() == "approved" {
            ResourceCompletion::mark_reviewed(&mut tx, reviewed.user_id(), reviewed.resource_id())
                .await?;
        }
        tx.commit().await?;
        Ok::<_, DatabaseError>(reviewed)
    }
    .await;
    let reviewed = recorded.map_err(submission_error)?;
    let approved = reviewed.submission_status() == "approved";

    tracing::info!(
        "submission {} {} by {}",
        reviewed.id(),
        reviewed.submission_status(),
        reviewer.user_id()
    );

    notify_submission_reviewed(state, &reviewed, approved).await;
    Ok(reviewed)
}

async fn notify_submission_reviewed(state: &AppState, submission: &Submission, approved: bool) {
    if !state.mailer().is_enabled() {
        return;
    }

    let mm = state.pool();
    let admin = AuthenticatedUser::admin();
    let loaded = async {
        let student = UserEntity::find_by_id(mm, &admin, submission.user_id()).await?;
        let resource = Resource::find_by_id(mm, &admin, submission.resource_id().to_string()).await?;
        Ok::<_, DatabaseError>((student, resource))
    }
    .await;

    let (Some(student), Some(resource)) = (match loaded {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("unable to load submission review details: {}", e);
            return;
        }
    }) else {
        return;
    };

    state.mailer().dispatch(
        mm,
        Notification::SubmissionReviewed {
            to: student.email().to_string(),
            context: SubmissionReviewed {
                student_name: student.full_name().to_string(),
                resource_title: resource.title().to_string(),
                approved,
                grade: submission.grade().map(str::to_string),
                comments: submission.review_comments().map(str::to_string),
                dashboard_url: dashboard_url(state),
            },
            links: EmailLinks {
                recipient_user_id: Some(student.id()),
                module_id: Some(resource.module_id().to_string()),
                pathway_id: Some(resource.pathway_id().to_string()),
                resource_submission_id: Some(submission.id()),
                module_completion_id: None,
            },
        },
    );
}

async fn notify_module_reviewed(state: &AppState, completion: &ModuleCompletion) {
    if !state.mailer().is_enabled() {
        return;
    }

    let mm = state.pool();
    let admin = AuthenticatedUser::admin();
    let loaded = async {
        let student = UserEntity::find_by_id(mm, &admin, completion.user_id()).await?;
        let module = Module::find_by_id(mm, &admin, completion.module_id().to_string()).await?;
        let pathway = Pathway::find_by_id(mm, &admin, completion.pathway_id().to_string()).await?;
        Ok::<_, DatabaseError>((student, module, pathway))
    }
    .await;

    let (Some(student), Some(module), Some(pathway)) = (match loaded {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("unable to load module review details: {}", e);
            return;
        }
    }) else {
        return;
    };

    let to = student.email().to_string();
    let context = ModuleReviewed {
        student_name: student.full_name().to_string(),
        module_title: module.title().to_string(),
        pathway_title: pathway.title().to_string(),
        comments: completion.review_comments().map(str::to_string),
        dashboard_url: dashboard_url(state),
    };
    let links = EmailLinks {
        recipient_user_id: Some(student.id()),
        module_id: Some(module.id().to_string()),
        pathway_id: Some(pathway.id().to_string()),
        resource_submission_id: None,
        module_completion_id: Some(completion.id()),
    };

    let notification = if completion.approval_status() == "approved" {
        Notification::ModuleApproved { to, context, links }
    } else {
        Notification::ModuleRejected { to, context, links }
    };
    state.mailer().dispatch(mm, notification);
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/submissions/pending",
    params(PendingQuery),
    responses(
        (status = 200, description = "Unreviewed submissions, oldest first", body = Vec<PendingSubmissionRow>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "review",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn pending_submissions_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require_staff()?;
    let rows = Submission::list_pending(
        state.pool(),
        query.pathway_id.as_deref(),
        query.limit(),
        query.offset(),
    )
    .await
    .map_err(submission_error)?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/submissions/{id}/review",
    params(("id" = Uuid, Path, description = "Submission id")),
    request_body = SubmissionReviewRequest,
    description = "Approves or rejects a submission. Approval marks the resource reviewed; the student is emailed either way",
    responses(
        (status = 200, description = "Reviewed submission", body = Submission),
        (status = 400, description = "Unknown status or grade", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "review",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn review_submission_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmissionReviewRequest>,
) -> WebResult<impl IntoResponse> {
    let reviewer = ctx.user()?;
    let reviewed = review_submission(&state, reviewer, id, &payload).await?;
    Ok((StatusCode::OK, Json(reviewed)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/module-completions/pending",
    params(PendingQuery),
    responses(
        (status = 200, description = "Module completions awaiting approval", body = Vec<PendingModuleCompletionRow>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "review",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn pending_module_completions_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require_staff()?;
    let rows = ModuleCompletion::list_pending(
        state.pool(),
        query.pathway_id.as_deref(),
        query.limit(),
        query.offset(),
    )
    .await
    .map_err(completion_error)?;

    Ok((StatusCode::OK, Json(rows)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/module-completions/{id}/review",
    params(("id" = Uuid, Path, description = "Module completion id")),
    request_body = ModuleReviewRequest,
    responses(
        (status = 200, description = "Reviewed module completion", body = ModuleCompletion),
        (status = 400, description = "Unknown approval status", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 404, description = "Module completion not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "review",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn review_module_completion_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModuleReviewRequest>,
) -> WebResult<impl IntoResponse> {
    let reviewer = ctx.user()?;
    reviewer.require_staff()?;

    let status = payload.approval_status.as_str();
    if status == "pending" || !APPROVAL_STATUSES.contains(&status) {
        return Err(WebError::user_bad_request(
            "approval_status must be one of: approved, rejected",
        ));
    }

    let mm = state.pool();
    let completion = ModuleCompletion::find_by_id(mm, id)
        .await
        .map_err(completion_error)?
        .ok_or_else(|| WebError::resource_not_found(ModuleCompletion::get_resource_type()))?;
    let reviewed = completion
        .review(
            mm,
            reviewer.user_id(),
            status,
            payload.review_comments.as_deref(),
        )
        .await
        .map_err(completion_error)?;
    tracing::info!(
        "module completion {} {} by {}",
        reviewed.id(),
        reviewed.approval_status(),
        reviewer.user_id()
    );

    notify_module_reviewed(&state, &reviewed).await;
    Ok((StatusCode::OK, Json(reviewed)))
}
