use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

mod common;

/// Pool with exactly three papers' worth of questions for the blueprint below.
async fn app_with_blueprint() -> (common::TestApp, String) {
    let app = common::create_test_app();
    app.seed("DBMS", 1, 2, 6, &["R", "U", "AP"]);
    app.seed("DBMS", 1, 5, 3, &["AN", "E"]);
    app.seed("DBMS", 2, 2, 6, &["R", "U", "C"]);

    let (status, body) = app
        .post_json(
            "/api/blueprints",
            json!({
                "title": "Mid term",
                "subject": "DBMS",
                "total_marks": 13,
                "number_of_papers": 3,
                "distribution": { "1": { "2": 2, "5": 1 }, "2": { "2": 2 } }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["id"].as_str().unwrap().to_string();
    (app, id)
}

fn question_ids(paper: &Value) -> Vec<String> {
    paper["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["question_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_generate_three_papers_without_overlap() {
    let (app, blueprint_id) = app_with_blueprint().await;

    let (status, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["message"], "Papers generated successfully");
    assert_eq!(body["count"], 3);
    assert_eq!(body["difficulty_levels"], json!(["easy", "medium", "hard"]));

    let papers = body["papers"].as_array().unwrap();
    let mut seen = HashSet::new();
    for paper in papers {
        assert_eq!(paper["total_questions"], 5);
        assert_eq!(paper["total_marks"], 13);
        assert_eq!(paper["exam_type"], "ISE");
        assert_eq!(paper["generation_id"], papers[0]["generation_id"]);
        for id in question_ids(paper) {
            assert!(seen.insert(id), "question reused within one batch");
        }
    }
    assert_eq!(seen.len(), 15);
    assert_eq!(papers[0]["title"], "Mid term - Easy Paper");
    assert_eq!(papers[2]["generation_metadata"]["difficulty_level"], "Hard");

    let (_, grouped) = app
        .get_json(&format!("/api/papers/blueprint/{blueprint_id}/papers"))
        .await;
    assert_eq!(grouped["total"], 3);
    assert_eq!(grouped["easy"].as_array().unwrap().len(), 1);
    assert_eq!(grouped["medium"].as_array().unwrap().len(), 1);
    assert_eq!(grouped["hard"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_exhausted_pool_falls_back_to_historical_questions() {
    let (app, blueprint_id) = app_with_blueprint().await;
    let (status, _) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": blueprint_id, "number_of_papers": 1, "difficulty": "Medium" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["difficulty_levels"], json!(["medium"]));
    let paper = &body["papers"][0];
    assert_eq!(paper["total_questions"], 5);
    assert_eq!(question_ids(paper).iter().collect::<HashSet<_>>().len(), 5);
    assert!(!body["warnings"].as_array().unwrap().is_empty());
    assert!(!paper["generation_metadata"]["warnings"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_exam_type_detection_and_override() {
    let (app, blueprint_id) = app_with_blueprint().await;

    let (_, body) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": blueprint_id, "number_of_papers": 1, "difficulty": "easy", "exam_type": "ese" }),
        )
        .await;
    assert_eq!(body["papers"][0]["exam_type"], "ESE");

    let app = common::create_test_app();
    app.seed("OS", 1, 10, 2, &["E"]);
    let (_, created) = app
        .post_json(
            "/api/blueprints",
            json!({ "title": "Finals", "subject": "OS", "total_marks": 10, "distribution": { "1": { "10": 1 } } }),
        )
        .await;
    let (_, body) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": created["id"], "difficulty": "hard" }),
        )
        .await;
    assert_eq!(body["papers"][0]["exam_type"], "ESE");
}

#[tokio::test]
async fn test_generate_rejects_bad_requests() {
    let (app, blueprint_id) = app_with_blueprint().await;

    let (status, body) = app.post_json("/api/papers/generate", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Blueprint ID is required");

    let (status, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": "nope" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Blueprint not found");

    let (status, body) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": blueprint_id, "number_of_papers": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Difficulty level required when generating single paper");

    let (status, body) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": blueprint_id, "number_of_papers": 1, "difficulty": "extreme" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid difficulty level: extreme");

    let (status, _) = app
        .post_json(
            "/api/papers/generate",
            json!({ "blueprint_id": blueprint_id, "number_of_papers": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.papers.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_bucket_persists_nothing() {
    let (app, blueprint_id) = app_with_blueprint().await;
    app.questions.rows.lock().unwrap().retain(|q| q.co != "CO2");

    let (status, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No questions available for Module 2, Marks 2.");
    assert!(app.papers.rows.lock().unwrap().is_empty());
    assert!(app.lock.held.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_generation_is_rejected() {
    let (app, blueprint_id) = app_with_blueprint().await;
    app.lock
        .held
        .lock()
        .unwrap()
        .insert(format!("papergen:generation:{blueprint_id}"));

    let (status, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["message"],
        "Paper generation already in progress for this blueprint"
    );

    app.lock.held.lock().unwrap().clear();
    let (status, _) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_storage_failure_releases_lock() {
    let (app, blueprint_id) = app_with_blueprint().await;
    app.papers.fail_inserts.store(true, Ordering::SeqCst);

    let (status, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
    assert!(app.lock.held.lock().unwrap().is_empty());

    app.papers.fail_inserts.store(false, Ordering::SeqCst);
    let (status, _) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_paper_listings() {
    let (app, blueprint_id) = app_with_blueprint().await;
    let (_, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    let first_id = body["papers"][0]["id"].as_str().unwrap().to_string();

    let (status, paper) = app.get_json(&format!("/api/papers/{first_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paper["difficulty"], "easy");

    let (_, recent) = app.get_json("/api/papers/recent?limit=2").await;
    assert_eq!(recent.as_array().unwrap().len(), 2);

    let (status, easy) = app.get_json("/api/papers/difficulty/EASY").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(easy.as_array().unwrap().len(), 1);

    let (status, body) = app.get_json("/api/papers/difficulty/extreme").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid difficulty level: extreme");

    let (status, body) = app.get_json("/api/papers/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Paper not found");

    let (_, configs) = app.get_json("/api/papers/difficulty-configs").await;
    assert_eq!(configs["configs"]["easy"]["name"], "Easy");
    assert_eq!(configs["configs"]["hard"]["rbt_distribution"]["C"], 10);
}

#[tokio::test]
async fn test_downloads_render_attachments() {
    let (app, blueprint_id) = app_with_blueprint().await;
    let (_, body) = app
        .post_json("/api/papers/generate", json!({ "blueprint_id": blueprint_id }))
        .await;
    let id = body["papers"][0]["id"].as_str().unwrap().to_string();

    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .uri(format!("/api/papers/{id}/download-pdf"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    assert_eq!(
        response.headers()["content-disposition"],
        format!("attachment; filename=\"paper_{id}_easy_ISE.pdf\"").as_str()
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let (status, bytes) = app
        .send(
            Request::builder()
                .uri(format!("/api/papers/{id}/download-xlsx"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"PK"));

    let (status, _) = app.get_json("/api/papers/unknown/download-pdf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
