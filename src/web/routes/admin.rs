//! Server-rendered grading dashboard for instructors and admins.

use std::fmt::Write;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    mail::templates::escape,
    model::{
        ResourceTyped,
        entity::{PendingSubmissionRow, Submission, SubmissionStats},
    },
    web::{
        AppState, RequestContext, WebError, WebResult,
        dto::{
            auth::MessageResponse,
            resources::{DownloadResponse, SubmissionReviewRequest},
        },
        error::ErrorResponse,
        middlewares,
        routes::review::review_submission,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/review/{id}", post(dashboard_review_handler))
        .route("/api/download/{id}", get(dashboard_download_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::extract_context_fn,
        ))
        .with_state(state)
}

fn submission_error(e: crate::model::DatabaseError) -> WebError {
    WebError::resource_fetch_error(Submission::get_resource_type(), e)
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Submissions</title>
<style>
body { font-family: sans-serif; margin: 2rem; color: #222; }
.stats { display: flex; gap: 2rem; margin-bottom: 2rem; }
.stat { background: #f4f4f8; padding: 1rem 1.5rem; border-radius: 6px; }
.stat b { display: block; font-size: 1.6rem; }
table { border-collapse: collapse; width: 100%; }
th, td { text-align: left; padding: .5rem; border-bottom: 1px solid #ddd; vertical-align: top; }
.status-uploaded { color: #b26b00; }
.status-approved { color: #1a7f37; }
.status-rejected { color: #cf222e; }
</style>
</head>
<body>
<h1>Submissions</h1>
"#;

const PAGE_SCRIPT: &str = r#"<script>
async function review(id, status) {
  const grade = status === 'approved' ? 'pass' : 'fail';
  const comments = document.getElementById('comments-' + id).value;
  const res = await fetch('/admin/api/review/' + id, {
    method: 'POST',
    credentials: 'same-origin',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ submission_status: status, grade: grade, review_comments: comments || null }),
  });
  const body = await res.json();
  alert(body.message);
  if (res.ok) { location.reload(); }
}
async function download(id) {
  const res = await fetch('/admin/api/download/' + id, { credentials: 'same-origin' });
  const body = await res.json();
  if (res.ok) { window.open(body.url, '_blank'); } else { alert(body.message); }
}
</script>
</body>
</html>
"#;

fn render_dashboard(stats: &SubmissionStats, rows: &[PendingSubmissionRow]) -> String {
    let mut page = String::from(PAGE_HEAD);

    let _ = write!(
        page,
        r#"<div class="stats">
<div class="stat"><b>{}</b>pending review</div>
<div class="stat"><b>{}</b>uploaded today</div>
<div class="stat"><b>{:.1}h</b>average wait</div>
</div>
"#,
        stats.total_pending, stats.uploaded_today, stats.avg_wait_hours
    );

    if rows.is_empty() {
        page.push_str("<p>No submissions yet.</p>\n");
    } else {
        page.push_str(
            "<table>\n<tr><th>Student</th><th>Resource</th><th>File</th><th>Status</th><th>Waiting</th><th>Review</th></tr>\n",
        );
        for row in rows {
            let _ = write!(
                page,
                r#"<tr>
<td>{name}<br><small>{email}</small></td>
<td>{resource}<br><small>{pathway} / {module}</small></td>
<td><a href="javascript:download('{id}')">{file}</a><br><small>{size} KB</small></td>
<td class="status-{status}">{status}{grade}</td>
<td>{hours:.1}h</td>
<td><textarea id="comments-{id}" rows="2">{comments}</textarea><br>
<button onclick="review('{id}', 'approved')">Approve</button>
<button onclick="review('{id}', 'rejected')">Reject</button></td>
</tr>
"#,
                id = row.id,
                name = escape(&row.user_name),
                email = escape(&row.user_email),
                resource = escape(&row.resource_title),
                pathway = escape(&row.pathway_title),
                module = escape(&row.module_title),
                file = escape(&row.file_name),
                size = row.file_size_bytes / 1024,
                status = escape(&row.submission_status),
                grade = row
                    .grade
                    .as_deref()
                    .map(|g| format!(" ({})", escape(g)))
                    .unwrap_or_default(),
                hours = row.hours_waiting,
                comments = escape(row.review_comments.as_deref().unwrap_or_default()),
            );
        }
        page.push_str("</table>\n");
    }

    page.push_str(PAGE_SCRIPT);
    page
}

#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Dashboard page", content_type = "text/html"),
        (status = 401, description = "You're not authorized", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
    ),
    tag = "admin",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn dashboard_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require_staff()?;
    let mm = state.pool();

    let stats = Submission::stats(mm).await.map_err(submission_error)?;
    let rows = Submission::list_for_dashboard(mm)
        .await
        .map_err(submission_error)?;

    Ok(Html(render_dashboard(&stats, &rows)))
}

#[utoipa::path(
    post,
    path = "/admin/api/review/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    request_body = SubmissionReviewRequest,
    responses(
        (status = 200, description = "Review recorded", body = MessageResponse),
        (status = 400, description = "Unknown status or grade", body = ErrorResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
    ),
    tag = "admin",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn dashboard_review_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmissionReviewRequest>,
) -> WebResult<impl IntoResponse> {
    let reviewer = ctx.user()?;
    review_submission(&state, reviewer, id, &payload).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Review submitted successfully")),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/api/download/{id}",
    params(("id" = Uuid, Path, description = "Submission id")),
    responses(
        (status = 200, description = "Time-limited download URL", body = DownloadResponse),
        (status = 403, description = "Staff only", body = ErrorResponse),
        (status = 404, description = "Submission not found", body = ErrorResponse),
    ),
    tag = "admin",
    security(("cookie" = []), ("bearer" = []))
)]
pub(crate) async fn dashboard_download_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    ctx.user()?.require_staff()?;

    let submission = Submission::find_by_id(state.pool(), id)
        .await
        .map_err(submission_error)?
        .ok_or_else(|| WebError::resource_not_found(Submission::get_resource_type()))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, status: &str) -> PendingSubmissionRow {
        PendingSubmissionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_email: "student@example.com".into(),
            user_name: name.into(),
            resource_id: "r1".into(),
            resource_title: "Build a parser".into(),
            module_id: "m1".into(),
            module_title: "Parsing".into(),
            pathway_id: "p1".into(),
            pathway_title: "Compilers".into(),
            file_name: "parser.zip".into(),
            file_size_bytes: 4096,
            file_type: "application/zip".into(),
            submission_status: status.into(),
            grade: None,
            review_comments: None,
            created_at: Utc::now(),
            hours_waiting: 2.5,
        }
    }

    #[test]
    fn dashboard_shows_stats_and_escapes_rows() {
        let stats = SubmissionStats {
            total_pending: 3,
            uploaded_today: 1,
            avg_wait_hours: 4.25,
        };
        let page = render_dashboard(&stats, &[row("<script>Eve</script>", "uploaded")]);

        assert!(page.contains("<b>3</b>pending review"));
        assert!(page.contains("4.2h") || page.contains("4.3h"));
        assert!(page.contains("&lt;script&gt;Eve&lt;/script&gt;"));
        assert!(!page.contains("<script>Eve"));
        assert!(page.contains("status-uploaded"));
    }

    #[test]
    fn empty_dashboard_says_so() {
        let stats = SubmissionStats {
            total_pending: 0,
            uploaded_today: 0,
            avg_wait_hours: 0.0,
        };
        assert!(render_dashboard(&stats, &[]).contains("No submissions yet."));
    }
}
