use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use crate::{
    model::{ResourceTyped, entity::Submission},
    storage::StorageError,
    web::{AppState, WebError, WebResult, dto::resources::SignedFileQuery, error::ErrorResponse},
};

/// Signed downloads. The signature is the credential, so no session is needed.
pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/{*path}", get(signed_file_handler))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{path}",
    params(
        ("path" = String, Path, description = "Object path"),
        SignedFileQuery
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 403, description = "Signature invalid or expired", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "files"
)]
pub(crate) async fn signed_file_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<SignedFileQuery>,
) -> WebResult<impl IntoResponse> {
    if !state
        .signer()
        .verify(&path, query.expires, &query.signature, Utc::now())
    {
        tracing::warn!("rejected file request with a bad signature for {}", path);
        return Err(WebError::resource_forbidden(Submission::get_resource_type()));
    }

    let bytes = match state.storage().get(&path).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound(_)) => {
            return Err(WebError::resource_not_found(
                Submission::get_resource_type(),
            ));
        }
        Err(e) => return Err(WebError::server_storage_error(e)),
    };
    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        bytes,
    ))
}
