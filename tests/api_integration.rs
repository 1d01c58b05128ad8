//! Full-stack API flows against an in-memory app instance.

use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_test_app, get_json, post_json};

#[tokio::test]
async fn health_ready_metrics() {
    let app = create_test_app().await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get_json(&app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert!(body["bank_size"].as_u64().unwrap() > 0);

    let (status, _) = get_json(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_endpoint_is_not_found() {
    let app = create_test_app().await;
    let (status, body) = get_json(&app, "/api/v1/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn start_returns_first_item_and_progress() {
    let app = create_test_app().await;
    let (status, body) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "nickname": "tester",
            "grade": "중2",
            "self_assess": "intermediate",
            "exam_experience": "none",
            "question_type": 1
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["session_id"].is_string());
    assert!(body["user_id"].is_string());
    let first_item = &body["first_item"];
    assert_eq!(first_item["question_type"], 1);
    assert_eq!(first_item["options"].as_array().unwrap().len(), 4);
    assert_eq!(first_item["distractors"].as_array().unwrap().len(), 3);
    assert_eq!(body["progress"]["items_completed"], 0);
    assert_eq!(body["progress"]["is_complete"], false);
}

#[tokio::test]
async fn invalid_question_type_is_rejected() {
    let app = create_test_app().await;
    let (status, body) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "grade": "중2",
            "self_assess": "intermediate",
            "exam_experience": "none",
            "question_type": 9
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn respond_to_unknown_session_is_not_found() {
    let app = create_test_app().await;
    let (status, body) = post_json(
        &app,
        "/api/v1/test/00000000-0000-0000-0000-000000000000/respond",
        json!({"item_id": 1, "is_correct": true}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn full_session_flow_reaches_results() {
    let app = create_test_app().await;
    let (_, start) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "grade": "고3",
            "self_assess": "advanced",
            "exam_experience": "수능",
            "question_type": 0
        }),
    )
    .await;
    let session_id = start["session_id"].as_str().unwrap().to_string();
    let mut item_id = start["first_item"]["item_id"].as_u64().unwrap();

    let mut is_complete = false;
    let mut last = serde_json::Value::Null;
    for turn in 0..40 {
        let (status, body) = post_json(
            &app,
            &format!("/api/v1/test/{session_id}/respond"),
            json!({"item_id": item_id, "is_correct": true, "response_time_ms": 1500}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "turn {turn}: {body}");
        if body["is_complete"].as_bool().unwrap() {
            is_complete = true;
            last = body;
            break;
        }
        item_id = body["next_item"]["item_id"].as_u64().unwrap();
    }
    assert!(is_complete, "session should terminate within 40 items");

    // Inline results on the terminating response.
    let results = &last["results"];
    assert!(results["theta"].as_f64().unwrap() > 1.0);
    assert_eq!(results["insufficient_data"], false);
    let items = last["progress"]["items_completed"].as_u64().unwrap();
    assert!((15..=40).contains(&items));

    // The results endpoint returns the same terminal report.
    let (status, report) = get_json(&app, &format!("/api/v1/test/{session_id}/results")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["cefr_level"], results["cefr_level"]);
    assert!(report["vocab_size_estimate"].as_u64().unwrap() > 0);

    // Post-test learn views work off the same session.
    let (status, plan) = get_json(&app, &format!("/api/v1/learn/{session_id}/plan")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(plan["weekly_plan"].as_array().unwrap().len() >= 1);

    let (status, matrix) = get_json(&app, &format!("/api/v1/learn/{session_id}/matrix")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(matrix["total_sampled"], 150);
    assert!(matrix["goal_theta"].as_f64().unwrap() > report["theta"].as_f64().unwrap());
}

#[tokio::test]
async fn duplicate_response_conflicts_with_committed_echo() {
    let app = create_test_app().await;
    let (_, start) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "grade": "중2",
            "self_assess": "intermediate",
            "exam_experience": "none",
            "question_type": 1
        }),
    )
    .await;
    let session_id = start["session_id"].as_str().unwrap().to_string();
    let item_id = start["first_item"]["item_id"].as_u64().unwrap();
    let payload = json!({"item_id": item_id, "is_correct": true, "response_time_ms": 900});

    let (status, first) = post_json(
        &app,
        &format!("/api/v1/test/{session_id}/respond"),
        payload.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["progress"]["items_completed"], 1);

    let (status, dup) = post_json(
        &app,
        &format!("/api/v1/test/{session_id}/respond"),
        payload,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(dup["error"], "conflict");
    // The committed response rides along for idempotent clients.
    assert_eq!(dup["detail"]["item_id"].as_u64().unwrap(), item_id);
    assert_eq!(dup["detail"]["is_correct"], true);

    // History length is unchanged: answering the pending item still works.
    let (status, results) =
        get_json(&app, &format!("/api/v1/test/{session_id}/results")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{results}");
}

#[tokio::test]
async fn out_of_order_response_is_rejected() {
    let app = create_test_app().await;
    let (_, start) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "grade": "중2",
            "self_assess": "intermediate",
            "exam_experience": "none",
            "question_type": 1
        }),
    )
    .await;
    let session_id = start["session_id"].as_str().unwrap().to_string();
    let pending = start["first_item"]["item_id"].as_u64().unwrap();
    let other = if pending == 0 { 1 } else { pending - 1 };

    let (status, body) = post_json(
        &app,
        &format!("/api/v1/test/{session_id}/respond"),
        json!({"item_id": other, "is_correct": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn goal_learning_flow_over_http() {
    let app = create_test_app().await;
    let (status, start) = post_json(
        &app,
        "/api/v1/learn/goal/start",
        json!({"goal_id": "elementary", "target_word_count": 50, "nickname": "learner"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{start}");
    let session_id = start["session_id"].as_str().unwrap().to_string();
    assert_eq!(start["goal_name"], "초등 어휘");
    assert_eq!(start["target_word_count"], 50);
    let card = &start["first_card"];
    assert_eq!(card["stage"], "first_exposure");
    assert_eq!(card["is_first_exposure"], true);
    let word = card["word"].as_str().unwrap().to_string();
    let qtype = card["question_type"].as_u64().unwrap();

    let (status, submit) = post_json(
        &app,
        &format!("/api/v1/learn/goal/{session_id}/submit"),
        json!({"word": word, "question_type": qtype, "self_rating": 2, "is_correct": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{submit}");
    assert_eq!(submit["session_progress"]["words_studied"], 1);
    assert_eq!(submit["session_progress"]["total_reviews"], 1);
    assert!(submit["next_card"].is_object());

    let (status, progress) =
        get_json(&app, &format!("/api/v1/learn/goal/{session_id}/progress")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["words_studied"], 1);
    assert_eq!(progress["words_mastered"], 0);
    assert_eq!(progress["target_word_count"], 50);
}

#[tokio::test]
async fn invalid_goal_and_rating_are_rejected() {
    let app = create_test_app().await;
    let (status, _) = post_json(
        &app,
        "/api/v1/learn/goal/start",
        json!({"goal_id": "collegiate"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, start) = post_json(
        &app,
        "/api/v1/learn/goal/start",
        json!({"goal_id": "middle"}),
    )
    .await;
    let session_id = start["session_id"].as_str().unwrap();
    let word = start["first_card"]["word"].as_str().unwrap();
    let (status, _) = post_json(
        &app,
        &format!("/api/v1/learn/goal/{session_id}/submit"),
        json!({"word": word, "question_type": 1, "self_rating": 7, "is_correct": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_endpoints_report_state() {
    let app = create_test_app().await;

    let (_, start) = post_json(
        &app,
        "/api/v1/test/start",
        json!({
            "grade": "중2",
            "self_assess": "intermediate",
            "exam_experience": "none",
            "question_type": 1
        }),
    )
    .await;
    assert!(start["session_id"].is_string());

    let (status, stats) = get_json(&app, "/api/v1/admin/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["active_test_sessions"], 1);
    assert_eq!(stats["sessions_started"], 1);
    assert_eq!(stats["bank"]["model"], "2PL");

    let (status, exposure) = get_json(&app, "/api/v1/admin/exposure").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exposure["total_sessions"], 1);

    let (status, expansion) = get_json(&app, "/api/v1/admin/exposure/expansion").await;
    assert_eq!(status, StatusCode::OK);
    assert!(expansion["message"].is_string());

    // Without a database, recalibration is a persistence error, not a crash.
    let (status, recal) = post_json(&app, "/api/v1/admin/recalibrate", json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(recal["error"], "persistence_unavailable");

    let (status, cleanup) = post_json(&app, "/api/v1/admin/cleanup", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleanup["evicted_test_sessions"], 0);
}

#[tokio::test]
async fn history_without_database_is_unavailable() {
    let app = create_test_app().await;
    let (status, body) = get_json(
        &app,
        "/api/v1/user/00000000-0000-0000-0000-000000000001/history",
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "persistence_unavailable");
}
