use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, DatabaseError, ResourceTyped, check_access,
        entity::{
            LEARNER_STATUSES, Module, Pathway, Resource, ResourceCompletion,
            ResourceProgressUpdate, Submission, SubmissionCreate,
        },
    },
    storage::{object_path, validate_upload},
    web::{
        AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::{
            auth::MessageResponse,
            resources::{DownloadResponse, ModuleResources, ResourceWithProgress, UploadResponse},
        },
        error::ErrorResponse,
        middlewares,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    // per-resource limits are checked after reading, this only caps the body
    let body_limit = state.config().storage().upload_body_limit();
    Router::new()
        .route("/pathways/{id}/resources", get(pathway_resources_handler))
        .route("/modules/{id}/resources", get(module_resources_handler))
        .route(
            "/modules/{id}/resources-with-progress",
            get(module_resources_with_progress_handler),
        )
        .route(
            "/users/me/resources/{id}/progress",
            get(resource_progress_handler).put(resource_progress_update_handler),
        )
        .route("/users/me/resources/{id}/start", post(resource_start_handler))
        .route(
            "/users/me/resources/{id}/complete",
            post(resource_complete_handler),
        )
        .route(
            "/users/me/resources/{id}/upload",
            post(resource_upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/users/me/resources/{id}/submissions",
            get(resource_submissions_handler),
        )
        .route(
            "/users/me/submissions/download/{id}",
            get(submission_download_handler),
        )
        .route("/users/me/submissions/{id}", delete(submission_delete_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn resource_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(Resource::get_resource_type(), e)
}

fn completion_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(ResourceCompletion::get_resource_type(), e)
}

fn submission_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(Submission::get_resource_type(), e)
}

async fn load_resource(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &str,
) -> WebResult<Resource> {
    Resource::find_by_id(state.pool(), user, id.to_string())
        .await
        .map_err(resource_error)?
        .ok_or_else(|| WebError::resource_not_found(Resource::get_resource_type()))
}

/// Loads a live submission the caller owns (admins pass too).
async fn load_own_submission(
    state: &AppState,
    user: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<Submission> {
    let mm = state.pool();
    let submission = Submission::find_by_id(mm, id)
        .await
        .map_err(submission_error)?
        .filter(|s| !s.is_deleted())
        .ok_or_else(|| WebError::resource_not_found(Submission::get_resource_type()))?;

    check_access(user, &submission)
        .map_err(|e| WebError::access_error(Submission::get_resource_type(), e))?;
    Ok(submission)
}

/// Pairs each resource with the caller's completion row and live submissions.
fn attach_progress(
    resources: Vec<Resource>,
    completions: &[ResourceCompletion],
    submissions: &[Submission],
) -> Vec<ResourceWithProgress> {
    resources
        .into_iter()
        .map(|resource| ResourceWithProgress {
            completion: completions
                .iter()
                .find(|c| c.resource_id() == resource.id())
                .cloned(),
            submissions: submissions
                .iter()
                .filter(|s| s.resource_id() == resource.id())
                .cloned()
                .collect(),
            resource,
        })
        .collect()
}

/// `submitted` and `reviewed` only come from an upload and a staff review, and
/// upload resources can't be marked `completed` by hand.
fn validate_progress(resource: &Resource, update: &ResourceProgressUpdate) -> WebResult<()> {
    if let Some(status) = update.status.as_deref() {
        if !LEARNER_STATUSES.contains(&status) {
            return Err(WebError::user_bad_request(format!(
                "status must be one of: {}",
                LEARNER_STATUSES.join(", ")
            )));
        }
        if status == "completed" && resource.requires_upload() {
            return Err(WebError::resource_bad_request(
                Resource::get_resource_type(),
                "This resource is completed by uploading a submission",
            ));
        }
    }
    if update
        .progress_percentage
        .is_some_and(|p| !(0..=100).contains(&p))
    {
        return Err(WebError::user_bad_request(
            "progress_percentage must be between 0 and 100",
        ));
    }
    if update.time_spent_minutes.is_some_and(|t| t < 0) {
        return Err(WebError::user_bad_request(
            "time_spent_minutes must not be negative",
        ));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/v1/pathways/{id}/resources",
    params(("id" = String, Path, description = "Pathway id")),
    description = "Every resource of a pathway grouped by module, with the caller's progress and submissions",
    responses(
        (status = 200, description = "Resources by module", body = Vec<ModuleResources>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Pathway not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn pathway_resources_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mm = state.pool();

    Pathway::find_by_id(mm, user, id.clone())
        .await
        .map_err(|e| WebError::resource_fetch_error(Pathway::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(Pathway::get_resource_type()))?;

    let modules = Module::list_by_pathway(mm, &id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Module::get_resource_type(), e))?;
    let mut resources = Resource::list_by_pathway(mm, &id)
        .await
        .map_err(resource_error)?;
    let completions = ResourceCompletion::list_for_user_in_pathway(mm, user.user_id(), &id)
        .await
        .map_err(completion_error)?;
    let submissions = Submission::list_for_user_in_pathway(mm, user.user_id(), &id)
        .await
        .map_err(submission_error)?;

    let grouped: Vec<ModuleResources> = modules
        .into_iter()
        .map(|module| {
            let (own, rest): (Vec<_>, Vec<_>) = resources
                .drain(..)
                .partition(|r| r.module_id() == module.id());
            resources = rest;
            ModuleResources {
                resources: attach_progress(own, &completions, &submissions),
                module,
            }
        })
        .collect();

    Ok((StatusCode::OK, Json(grouped)))
}

#[utoipa::path(
    get,
    path = "/api/v1/modules/{id}/resources",
    params(("id" = String, Path, description = "Module id")),
    responses(
        (status = 200, description = "Resources in display order", body = Vec<Resource>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Module not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn module_resources_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mm = state.pool();

    Module::find_by_id(mm, user, id.clone())
        .await
        .map_err(|e| WebError::resource_fetch_error(Module::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(Module::get_resource_type()))?;
    let resources = Resource::list_by_module(mm, &id)
        .await
        .map_err(resource_error)?;

    Ok((StatusCode::OK, Json(resources)))
}

#[utoipa::path(
    get,
    path = "/api/v1/modules/{id}/resources-with-progress",
    params(("id" = String, Path, description = "Module id")),
    responses(
        (status = 200, description = "Resources with the caller's progress", body = ModuleResources),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Module not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn module_resources_with_progress_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mm = state.pool();

    let module = Module::find_by_id(mm, user, id.clone())
        .await
        .map_err(|e| WebError::resource_fetch_error(Module::get_resource_type(), e))?
        .ok_or_else(|| WebError::resource_not_found(Module::get_resource_type()))?;
    let resources = Resource::list_by_module(mm, &id)
        .await
        .map_err(resource_error)?;
    let completions = ResourceCompletion::list_for_user_in_module(mm, user.user_id(), &id)
        .await
        .map_err(completion_error)?;
    let submissions = Submission::list_for_user_in_pathway(mm, user.user_id(), module.pathway_id())
        .await
        .map_err(submission_error)?;

    Ok((
        StatusCode::OK,
        Json(ModuleResources {
            resources: attach_progress(resources, &completions, &submissions),
            module,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me/resources/{id}/progress",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Completion row, null when never started", body = Option<ResourceCompletion>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_progress_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let resource = load_resource(&state, user, &id).await?;
    let completion = ResourceCompletion::find(state.pool(), user.user_id(), resource.id())
        .await
        .map_err(completion_error)?;

    Ok((StatusCode::OK, Json(completion)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me/resources/{id}/progress",
    params(("id" = String, Path, description = "Resource id")),
    request_body = ResourceProgressUpdate,
    responses(
        (status = 200, description = "Updated completion row", body = ResourceCompletion),
        (status = 400, description = "Unknown status or values out of range", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_progress_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ResourceProgressUpdate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let resource = load_resource(&state, user, &id).await?;
    validate_progress(&resource, &payload)?;

    let completion =
        ResourceCompletion::upsert_progress(state.pool(), user.user_id(), &resource, &payload)
            .await
            .map_err(completion_error)?;
    Ok((StatusCode::OK, Json(completion)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/me/resources/{id}/start",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Completion row in progress", body = ResourceCompletion),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_start_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let resource = load_resource(&state, user, &id).await?;
    let completion = ResourceCompletion::start(state.pool(), user.user_id(), &resource)
        .await
        .map_err(completion_error)?;

    Ok((StatusCode::OK, Json(completion)))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/me/resources/{id}/complete",
    params(("id" = String, Path, description = "Resource id")),
    description = "Marks a resource completed. Resources that need an upload are completed by submitting instead",
    responses(
        (status = 200, description = "Completed row", body = ResourceCompletion),
        (status = 400, description = "Resource requires a submission", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_complete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let resource = load_resource(&state, user, &id).await?;
    if resource.requires_upload() {
        return Err(WebError::resource_bad_request(
            Resource::get_resource_type(),
            "This resource is completed by uploading a submission",
        ));
    }

    let update = ResourceProgressUpdate {
        status: Some("completed".to_string()),
        progress_percentage: Some(100),
        ..Default::default()
    };
    let completion =
        ResourceCompletion::upsert_progress(state.pool(), user.user_id(), &resource, &update)
            .await
            .map_err(completion_error)?;
    Ok((StatusCode::OK, Json(completion)))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[utoipa::path(
    post,
    path = "/api/v1/users/me/resources/{id}/upload",
    params(("id" = String, Path, description = "Resource id")),
    request_body(content_type = "multipart/form-data", description = "A single `file` field"),
    description = "Stores a file for the resource, records the submission and marks the resource submitted",
    responses(
        (status = 201, description = "Submission recorded", body = UploadResponse),
        (status = 400, description = "Upload not accepted", body = ErrorResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_upload_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let mm = state.pool();
    let resource = load_resource(&state, user, &id).await?;
    let submission_type = Submission::get_resource_type();

    if !resource.requires_upload() {
        return Err(WebError::resource_bad_request(
            submission_type,
            "This resource does not accept file uploads",
        ));
    }
    if !resource.allow_resubmission()
        && Submission::has_live(mm, user.user_id(), resource.id())
            .await
            .map_err(submission_error)?
    {
        return Err(WebError::resource_bad_request(
            submission_type,
            "Resubmission is not allowed for this resource",
        ));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::user_bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| WebError::user_bad_request(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err(WebError::resource_bad_request(
            submission_type,
            "No file provided",
        ));
    };

    let mime = validate_upload(
        &file_name,
        bytes.len(),
        resource.max_file_size_mb(),
        resource.accepted_file_types(),
    )?;

    let now = Utc::now();
    let path = object_path(
        resource.pathway_id(),
        user.user_id(),
        resource.id(),
        &file_name,
        now,
    );
    state
        .storage()
        .put(&path, &bytes)
        .await
        .map_err(WebError::server_storage_error)?;
    let storage_url = state
        .signer()
        .sign(&path, now)
        .map(|signed| signed.url)
        .unwrap_or_else(|_| path.clone());

    let recorded = async {
        let mut tx = mm.begin().await?;
        let completion = ResourceCompletion::mark_submitted(&mut tx, user.user_id(), &resource).await?;
        let submission = Submission::create(
            &mut tx,
            SubmissionCreate {
                user_id: user.user_id(),
                resource_id: resource.id().to_string(),
                resource_completion_id: completion.id(),
                file_name: file_name.clone(),
                file_size_bytes: bytes.len() as i64,
                file_type: mime,
                storage_bucket: state.storage().bucket().to_string(),
                storage_path: path.clone(),
                storage_url,
                upload_ip: client_ip(&headers),
            },
        )
        .await?;
        tx.commit().await?;
        Ok::<_, DatabaseError>(UploadResponse {
            submission,
            completion,
        })
    }
    .await;

    match recorded {
        Ok(response) => {
            tracing::info!(
                "user {} uploaded {} for resource {}",
                user.user_id(),
                path,
                resource.id()
            );
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(e) => {
            if let Err(cleanup) = state.storage().delete(&path).await {
                tracing::warn!("unable to remove orphaned upload {}: {}", path, cleanup);
            }
            Err(submission_error(e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me/resources/{id}/submissions",
    params(("id" = String, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Live submissions, newest first", body = Vec<Submission>),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 404, description = "Resource not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn resource_submissions_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let resource = load_resource(&state, user, &id).await?;
    let submissions = Submission::list_for_user_resource(state.pool(), user.user_id(), resource.id())
        .await
        .map_err(submission_error)?;

    Ok((StatusCode::OK, Json(submissions)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me/submissions/download/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    responses(
        (status = 200, description = "Time-limited download URL", body = DownloadResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Not your submission", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn submission_download_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let submission = load_own_submission(&state, user, id).await?;
    let url = state
        .signer()
        .sign(submission.storage_path(), Utc::now())
        .map_err(WebError::server_storage_error)?;

    Ok((
        StatusCode::OK,
        Json(DownloadResponse {
            url,
            file_name: submission.file_name().to_string(),
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me/submissions/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    description = "Soft-deletes a submission. The stored file is kept",
    responses(
        (status = 200, description = "Submission deleted", body = MessageResponse),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Not your submission", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "resources",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn submission_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let submission = load_own_submission(&state, user, id).await?;
    submission
        .soft_delete(state.pool())
        .await
        .map_err(submission_error)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Submission deleted")),
    ))
}
