mod common;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::common::{
    ARTICLE_ID, Action, INTRO_MODULE_ID, PATHWAY_ID, PROJECT_MODULE_ID, VIDEO_ID, seed_curriculum,
    setup_server, setup_test_db, student_flow,
};

fn has_achievement(list: &Value, id: &str) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|a| a == id || a["id"] == id))
}

#[tokio::test]
async fn route_pathway_catalog_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    student_flow("catalog@example.com")
        .step(
            Action::new("pathways", "GET", "/api/v1/progress/pathways").assert_json(|body| {
                let items = body.as_array().expect("array");
                assert_eq!(items.len(), 1);
                assert_eq!(items[0]["total_modules"], 2);
            }),
        )
        .step(
            Action::new("pathway_detail", "GET", &format!("/api/v1/progress/pathways/{PATHWAY_ID}"))
                .assert_json(|body| {
                    assert_eq!(body["progress"]["progress_percentage"], 0);
                    assert_eq!(body["modules"].as_array().map(Vec::len), Some(2));
                    assert_eq!(body["modules"][0]["completed"], false);
                    assert_eq!(body["next_module"]["id"], INTRO_MODULE_ID);
                }),
        )
        .step(
            Action::new("pathway_missing", "GET", "/api/v1/progress/pathways/nope")
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("streak_empty", "GET", "/api/v1/progress/streak")
                .assert_json(|body| assert_eq!(body["current"], 0)),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_progress_requires_login_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    common::Flow::new()
        .step(
            Action::new("pathways", "GET", "/api/v1/progress/pathways")
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(
            Action::new("summary", "GET", "/api/v1/progress/user/summary")
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_complete_module_cascade_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    let complete_intro = json!({
        "module_id": INTRO_MODULE_ID,
        "pathway_id": PATHWAY_ID,
        "time_spent_minutes": 25,
    });

    student_flow("cascade@example.com")
        .step(
            Action::new("start_pathway", "POST", "/api/v1/progress/user/start-pathway")
                .with_body(json!({ "pathway_id": PATHWAY_ID }))
                .assert_json(|body| {
                    assert_eq!(body["progress"]["pathway_id"], PATHWAY_ID);
                    assert!(has_achievement(&body["new_achievements"], "pathway-starter"));
                }),
        )
        // nothing done yet
        .step(
            Action::new("complete_too_early", "POST", "/api/v1/progress/modules/complete")
                .with_body(complete_intro.clone())
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_body(|body| {
                    assert!(body.contains(ARTICLE_ID));
                    assert!(body.contains(VIDEO_ID));
                }),
        )
        .step(
            Action::new(
                "complete_article",
                "POST",
                &format!("/api/v1/users/me/resources/{ARTICLE_ID}/complete"),
            )
            .assert_json(|body| {
                assert_eq!(body["status"], "completed");
                assert_eq!(body["progress_percentage"], 100);
            }),
        )
        .step(
            Action::new(
                "video_progress",
                "PUT",
                &format!("/api/v1/users/me/resources/{VIDEO_ID}/progress"),
            )
            .with_body(json!({ "status": "completed" })),
        )
        .step(
            Action::new("wrong_pathway", "POST", "/api/v1/progress/modules/complete")
                .with_body(json!({
                    "module_id": INTRO_MODULE_ID,
                    "pathway_id": "other-pathway",
                }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("unknown_module", "POST", "/api/v1/progress/modules/complete")
                .with_body(json!({ "module_id": "nope", "pathway_id": PATHWAY_ID }))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("complete_intro", "POST", "/api/v1/progress/modules/complete")
                .with_body(complete_intro.clone())
                .assert_json(|body| {
                    assert_eq!(body["newly_completed"], true);
                    assert_eq!(body["progress"]["completed_modules"], 1);
                    assert_eq!(body["progress"]["progress_percentage"], 50);
                    assert_eq!(body["progress"]["total_time_spent_minutes"], 25);
                    assert_eq!(body["streak"]["current"], 1);
                    assert_eq!(body["completion"]["approval_status"], "pending");
                    assert!(has_achievement(&body["new_achievements"], "first-module"));
                }),
        )
        // completing twice changes nothing
        .step(
            Action::new("complete_intro_again", "POST", "/api/v1/progress/modules/complete")
                .with_body(complete_intro)
                .assert_json(|body| {
                    assert_eq!(body["newly_completed"], false);
                    assert_eq!(body["progress"]["completed_modules"], 1);
                    assert_eq!(body["progress"]["total_time_spent_minutes"], 25);
                }),
        )
        .step(
            Action::new("completions", "GET", "/api/v1/progress/modules/completions")
                .with_param("pathway_id", PATHWAY_ID)
                .assert_json(|body| {
                    assert_eq!(body.as_array().map(Vec::len), Some(1));
                    assert_eq!(body[0]["module_id"], INTRO_MODULE_ID);
                }),
        )
        .step(
            Action::new("detail_after", "GET", &format!("/api/v1/progress/pathways/{PATHWAY_ID}"))
                .assert_json(|body| {
                    assert_eq!(body["modules"][0]["completed"], true);
                    assert_eq!(body["next_module"]["id"], PROJECT_MODULE_ID);
                }),
        )
        .step(
            Action::new("summary", "GET", "/api/v1/progress/user/summary").assert_json(|body| {
                assert_eq!(body["modules_completed"], 1);
                assert_eq!(body["pathways_started"], 1);
                assert_eq!(body["current_streak"], 1);
            }),
        )
        .step(
            Action::new("dashboard", "GET", "/api/v1/progress/user/dashboard").assert_json(
                |body| {
                    assert_eq!(body["pathways"][0]["completed_modules"], 1);
                    assert!(has_achievement(&body["recent_achievements"], "first-module"));
                    assert_eq!(body["streak"]["longest"], 1);
                },
            ),
        )
        .step(
            Action::new("achievements", "GET", "/api/v1/progress/achievements").assert_json(
                |body| {
                    let items = body.as_array().expect("array");
                    let first = items.iter().find(|a| a["id"] == "first-module").expect("seeded");
                    assert_eq!(first["earned"], true);
                    let streak = items.iter().find(|a| a["id"] == "streak-7").expect("seeded");
                    assert_eq!(streak["earned"], false);
                },
            ),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_progress_update_test() {
    let pool = setup_test_db().await;
    seed_curriculum(&pool).await;
    let mut server = setup_server(&pool).await;

    let path = format!("/api/v1/progress/user/pathway/{PATHWAY_ID}");
    student_flow("update@example.com")
        .step(
            Action::new("out_of_range", "PUT", &path)
                .with_body(json!({ "progress_percentage": 150 }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("finish_pathway", "PUT", &path)
                .with_body(json!({ "progress_percentage": 100 }))
                .assert_json(|body| {
                    assert_eq!(body["progress"]["progress_percentage"], 100);
                    assert!(body["progress"]["completed_at"].is_string());
                    assert!(has_achievement(&body["new_achievements"], "first-pathway"));
                }),
        )
        .step(
            Action::new("user_achievements", "GET", "/api/v1/progress/achievements/user")
                .assert_json(|body| assert!(has_achievement(body, "first-pathway"))),
        )
        .step(
            Action::new("resource_status", "PUT", &format!("/api/v1/users/me/resources/{VIDEO_ID}/progress"))
                .with_body(json!({ "status": "watched" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut server, pool)
        .await;
}
