mod common;
use axum_test::multipart::{MultipartForm, Part};
use learnpath::auth::hash_password;
use learnpath::model::CrudRepository;
use learnpath::model::entity::{
    Resource, ResourceCompletion, Submission, SubmissionCreate, UserEntity, UserEntityCreateUpdate,
};
use learnpath::web::AuthenticatedUser;
use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use crate::common::{
    ARTICLE_ID, Action, FlowContext, PATHWAY_ID, PROJECT_ID, PROJECT_MODULE_ID, STUDENT_PASSWORD,
    seed_curriculum, setup_server, setup_test_db, signin_action, signin_admin_action,
    signup_action, student_flow,
};

fn file_form(name: &str, mime: &str, bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes).file_name(name).mime_type(mime),
    )
}

fn upload_path(resource: &str) -> String {
    format!("/api/v1/users/me/resources/{resource}/upload")
}

/// Path and query of the signed URL stored under `key`, so the test server can fetch it.
fn signed_path(ctx: &FlowContext, key: &str) -> String {
    let url = Url::parse(&ctx.str_at(key, "/url")).expect("signed url");
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

fn submission_id(ctx: &FlowContext) -> String {
    ctx.str_at("upload", "/submission/id")
}

#[tokio::test]
async fn route_resource_listing_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    student_flow("lister@example.com")
        .step(Action::new(
            "start_article",
            "POST",
            &format!("/api/v1/users/me/resources/{ARTICLE_ID}/start"),
        ))
        .step(
            Action::new(
                "pathway_resources",
                "GET",
                &format!("/api/v1/pathways/{PATHWAY_ID}/resources"),
            )
            .assert_json(|body| {
                let modules = body.as_array().expect("array");
                assert_eq!(modules.len(), 2);
                assert_eq!(modules[0]["resources"].as_array().map(Vec::len), Some(2));
                assert_eq!(modules[0]["resources"][0]["id"], ARTICLE_ID);
                assert_eq!(modules[0]["resources"][0]["completion"]["status"], "in_progress");
                assert!(modules[0]["resources"][1]["completion"].is_null());
                assert_eq!(modules[1]["resources"][0]["id"], PROJECT_ID);
            }),
        )
        .step(
            Action::new(
                "module_resources",
                "GET",
                &format!("/api/v1/modules/{PROJECT_MODULE_ID}/resources"),
            )
            .assert_json(|body| {
                assert_eq!(body[0]["requires_upload"], true);
                assert_eq!(body[0]["type"], "project");
            }),
        )
        .step(
            Action::new(
                "module_resources_progress",
                "GET",
                &format!("/api/v1/modules/{PROJECT_MODULE_ID}/resources-with-progress"),
            )
            .assert_json(|body| {
                assert_eq!(body["module"]["id"], PROJECT_MODULE_ID);
                assert!(body["resources"][0]["submissions"].as_array().is_some_and(Vec::is_empty));
            }),
        )
        .step(
            Action::new("unknown_module", "GET", "/api/v1/modules/nope/resources")
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("unknown_resource", "GET", "/api/v1/users/me/resources/nope/progress")
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new(
                "complete_upload_resource",
                "POST",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/complete"),
            )
            .with_expect(StatusCode::BAD_REQUEST),
        )
        // upload resources only finish through an upload and a review
        .step(
            Action::new(
                "self_review_upload_resource",
                "PUT",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/progress"),
            )
            .with_body(json!({ "status": "reviewed" }))
            .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new(
                "self_complete_upload_resource",
                "PUT",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/progress"),
            )
            .with_body(json!({ "status": "completed" }))
            .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new(
                "self_submit_article",
                "PUT",
                &format!("/api/v1/users/me/resources/{ARTICLE_ID}/progress"),
            )
            .with_body(json!({ "status": "submitted" }))
            .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new(
                "project_still_unstarted",
                "GET",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/progress"),
            )
            .assert_json(|body| assert!(body.is_null())),
        )
        .step(
            Action::new(
                "complete_article",
                "PUT",
                &format!("/api/v1/users/me/resources/{ARTICLE_ID}/progress"),
            )
            .with_body(json!({ "status": "completed" }))
            .assert_json(|body| {
                assert_eq!(body["status"], "completed");
                assert_eq!(body["progress_percentage"], 100);
            }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_upload_validation_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    student_flow("uploader@example.com")
        .step(
            Action::new("upload_to_article", "POST", &upload_path(ARTICLE_ID))
                .with_multipart(file_form("notes.pdf", "application/pdf", b"%PDF-1.4".to_vec()))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("does not accept file uploads"))),
        )
        .step(
            Action::new("upload_wrong_type", "POST", &upload_path(PROJECT_ID))
                .with_multipart(file_form("notes.txt", "text/plain", b"hello".to_vec()))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("upload_unknown_type", "POST", &upload_path(PROJECT_ID))
                .with_multipart(file_form("notes", "application/pdf", b"%PDF-1.4".to_vec()))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("upload_too_large", "POST", &upload_path(PROJECT_ID))
                .with_multipart(file_form(
                    "big.pdf",
                    "application/pdf",
                    vec![b'x'; 1024 * 1024 + 1],
                ))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| assert!(body.contains("1MB"))),
        )
        .step(
            Action::new("upload_no_file", "POST", &upload_path(PROJECT_ID))
                .with_multipart(MultipartForm::new().add_text("comment", "forgot the file"))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("upload_unknown_resource", "POST", &upload_path("nope"))
                .with_multipart(file_form("a.pdf", "application/pdf", b"%PDF".to_vec()))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_submission_review_flow_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    student_flow("author@example.com")
        .step(
            Action::new("upload", "POST", &upload_path(PROJECT_ID))
                .with_multipart(file_form(
                    "../../My Report.pdf",
                    "application/pdf",
                    b"%PDF-1.4 report".to_vec(),
                ))
                .with_expect(StatusCode::CREATED)
                .with_save_as("upload")
                .assert_json(|body| {
                    assert_eq!(body["submission"]["submission_status"], "uploaded");
                    assert_eq!(body["submission"]["file_type"], "application/pdf");
                    assert_eq!(body["completion"]["status"], "submitted");
                    assert_eq!(body["completion"]["submission_count"], 1);
                    let path = body["submission"]["storage_path"].as_str().expect("path");
                    assert!(path.starts_with(&format!("pathways/{PATHWAY_ID}/users/")));
                    assert!(path.ends_with("_My Report.pdf"));
                    assert!(!path.contains(".."));
                }),
        )
        // resubmission is disabled for this resource
        .step(
            Action::new("upload_again", "POST", &upload_path(PROJECT_ID))
                .with_multipart(file_form("v2.pdf", "application/pdf", b"%PDF-1.4".to_vec()))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new(
                "submissions",
                "GET",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/submissions"),
            )
            .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(1))),
        )
        .step(
            Action::new("download", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/users/me/submissions/download/{}", submission_id(ctx))
                })
                .with_save_as("download")
                .assert_json(|body| {
                    assert_eq!(body["file_name"], "../../My Report.pdf");
                    assert!(body["url"].as_str().is_some_and(|u| u.contains("signature=")));
                }),
        )
        .step(
            Action::new("fetch_signed", "GET", "dynamic")
                .with_dyn_path(|ctx| signed_path(ctx, "download")),
        )
        .step(
            Action::new("fetch_tampered", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    signed_path(ctx, "download").replace("signature=", "signature=00")
                })
                .with_expect(StatusCode::FORBIDDEN),
        )
        // students can't review
        .step(
            Action::new("student_pending", "GET", "/api/v1/admin/submissions/pending")
                .with_expect(StatusCode::FORBIDDEN),
        )
        // another student can't touch the submission
        .step(
            signup_action("other@example.com", "Other", STUDENT_PASSWORD)
                .with_save_cookies(false),
        )
        .step(signin_action("other@example.com", STUDENT_PASSWORD).with_clear_cookies(true))
        .step(
            Action::new("other_download", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/users/me/submissions/download/{}", submission_id(ctx))
                })
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("other_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/me/submissions/{}", submission_id(ctx)))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(signin_admin_action())
        .step(
            Action::new("pending", "GET", "/api/v1/admin/submissions/pending")
                .with_param("pathway_id", PATHWAY_ID)
                .assert_json(|body| {
                    assert_eq!(body.as_array().map(Vec::len), Some(1));
                    assert_eq!(body[0]["user_email"], "author@example.com");
                    assert_eq!(body[0]["resource_title"], "Build a CLI");
                }),
        )
        .step(
            Action::new("review_bad_status", "POST", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/admin/submissions/{}/review", submission_id(ctx))
                })
                .with_body(json!({ "submission_status": "maybe" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("review", "POST", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/admin/submissions/{}/review", submission_id(ctx))
                })
                .with_body(json!({
                    "submission_status": "approved",
                    "review_comments": "Nice work",
                }))
                .assert_json(|body| {
                    assert_eq!(body["submission_status"], "approved");
                    assert_eq!(body["grade"], "pass");
                    assert_eq!(body["review_comments"], "Nice work");
                }),
        )
        .step(
            Action::new("pending_after_review", "GET", "/api/v1/admin/submissions/pending")
                .assert_json(|body| assert_eq!(body.as_array().map(Vec::len), Some(0))),
        )
        .step(
            Action::new("admin_download", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/admin/api/download/{}", submission_id(ctx))),
        )
        .step(
            Action::new("review_missing", "POST", "/api/v1/admin/submissions/00000000-0000-0000-0000-000000000000/review")
                .with_body(json!({ "submission_status": "rejected" }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        // back to the author: the resource is reviewed and the module can be completed
        .step(signin_action("author@example.com", STUDENT_PASSWORD).with_clear_cookies(true))
        .step(
            Action::new(
                "project_progress",
                "GET",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/progress"),
            )
            .assert_json(|body| assert_eq!(body["status"], "reviewed")),
        )
        .step(
            Action::new(
                "reviewed_not_demoted",
                "PUT",
                &format!("/api/v1/users/me/resources/{PROJECT_ID}/progress"),
            )
            .with_body(json!({ "status": "in_progress", "time_spent_minutes": 45 }))
            .assert_json(|body| {
                assert_eq!(body["status"], "reviewed");
                assert_eq!(body["progress_percentage"], 100);
                assert_eq!(body["time_spent_minutes"], 45);
            }),
        )
        .step(
            Action::new("complete_project", "POST", "/api/v1/progress/modules/complete")
                .with_body(json!({
                    "module_id": PROJECT_MODULE_ID,
                    "pathway_id": PATHWAY_ID,
                    "time_spent_minutes": 90,
                }))
                .with_save_as("module_completion")
                .assert_json(|body| {
                    assert_eq!(body["progress"]["progress_percentage"], 50);
                }),
        )
        .step(
            Action::new("delete_own", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/v1/users/me/submissions/{}", submission_id(ctx))),
        )
        .step(
            Action::new("download_deleted", "GET", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/v1/users/me/submissions/download/{}", submission_id(ctx))
                })
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(signin_admin_action())
        .step(
            Action::new("pending_modules", "GET", "/api/v1/admin/module-completions/pending")
                .assert_json(|body| {
                    assert_eq!(body.as_array().map(Vec::len), Some(1));
                    assert_eq!(body[0]["module_id"], PROJECT_MODULE_ID);
                    assert_eq!(body[0]["time_spent_minutes"], 90);
                }),
        )
        .step(
            Action::new("review_module_pending", "POST", "dynamic")
                .with_dyn_path(|ctx| {
                    format!(
                        "/api/v1/admin/module-completions/{}/review",
                        ctx.str_at("module_completion", "/completion/id")
                    )
                })
                .with_body(json!({ "approval_status": "pending" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("review_module", "POST", "dynamic")
                .with_dyn_path(|ctx| {
                    format!(
                        "/api/v1/admin/module-completions/{}/review",
                        ctx.str_at("module_completion", "/completion/id")
                    )
                })
                .with_body(json!({
                    "approval_status": "rejected",
                    "review_comments": "Add tests",
                }))
                .assert_json(|body| {
                    assert_eq!(body["approval_status"], "rejected");
                    assert_eq!(body["review_comments"], "Add tests");
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_admin_dashboard_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    student_flow("peek@example.com")
        .step(Action::new("dashboard_student", "GET", "/admin").with_expect(StatusCode::FORBIDDEN))
        .step(signin_admin_action())
        .step(Action::new("dashboard_admin", "GET", "/admin"))
        .step(
            Action::new("dashboard_review_missing", "POST", "/admin/api/review/00000000-0000-0000-0000-000000000000")
                .with_body(json!({ "submission_status": "approved" }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(Action::new("health", "GET", "/health").assert_json(|body| {
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["database"], true);
            assert_eq!(body["email"], false);
        }))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn submission_review_is_one_transaction_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mm = pool.model_manager();
    let admin = AuthenticatedUser::admin();

    let student = UserEntity::create(
        &mm,
        &admin,
        UserEntityCreateUpdate::with_password(
            "txn@example.com",
            "Txn",
            hash_password(STUDENT_PASSWORD).unwrap(),
        ),
    )
    .await
    .unwrap();
    let resource = Resource::find_by_id(&mm, &admin, PROJECT_ID.to_string())
        .await
        .unwrap()
        .unwrap();

    let mut tx = mm.begin().await.unwrap();
    let completion = ResourceCompletion::mark_submitted(&mut tx, student.id(), &resource)
        .await
        .unwrap();
    let submission = Submission::create(
        &mut tx,
        SubmissionCreate {
            user_id: student.id(),
            resource_id: PROJECT_ID.to_string(),
            resource_completion_id: completion.id(),
            file_name: "report.pdf".into(),
            file_size_bytes: 8,
            file_type: "application/pdf".into(),
            storage_bucket: "test".into(),
            storage_path: "pathways/p/report.pdf".into(),
            storage_url: "pathways/p/report.pdf".into(),
            upload_ip: None,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    // review and completion update share the transaction, dropping it undoes both
    {
        let mut tx = mm.begin().await.unwrap();
        let reviewed = submission
            .clone()
            .review(&mut tx, admin.user_id(), "approved", "pass", None)
            .await
            .unwrap();
        ResourceCompletion::mark_reviewed(&mut tx, reviewed.user_id(), reviewed.resource_id())
            .await
            .unwrap();
    }

    let stored = Submission::find_by_id(&mm, submission.id()).await.unwrap().unwrap();
    assert_eq!(stored.submission_status(), "uploaded");
    let completion = ResourceCompletion::find(&mm, student.id(), PROJECT_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completion.status(), "submitted");
}
