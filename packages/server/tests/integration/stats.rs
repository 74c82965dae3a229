use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};

use server::entity::prediction_session;

use crate::common::{TestApp, blank_png, routes};

const ALICE: (&str, &str) = ("alice", "wonderland");
const BOB: (&str, &str) = ("bob", "builder");

/// Move a session outside the stats window.
async fn age_session(app: &TestApp, uid: &str, days: i64) {
    prediction_session::ActiveModel {
        uid: Set(uid.to_string()),
        timestamp: Set(Utc::now() - Duration::days(days)),
        ..Default::default()
    }
    .update(&app.db)
    .await
    .unwrap();
}

#[tokio::test]
async fn empty_history_reports_zeroes() {
    let app = TestApp::spawn().await;

    let count = app.get(routes::COUNT, Some(ALICE)).await;
    assert_eq!(count.body["count"], 0);

    let labels = app.get(routes::LABELS, Some(ALICE)).await;
    assert_eq!(labels.body["labels"], serde_json::json!([]));

    let stats = app.get(routes::STATS, Some(ALICE)).await;
    assert_eq!(stats.status, 200, "{}", stats.text());
    assert_eq!(stats.body["total_predictions"], 0);
    assert_eq!(stats.body["average_confidence"], 0.0);
    assert_eq!(stats.body["most_frequent_labels"], serde_json::json!([]));
}

#[tokio::test]
async fn aggregates_cover_own_recent_sessions() {
    let app = TestApp::spawn().await;
    app.create_prediction(ALICE).await;
    app.create_prediction(ALICE).await;
    app.predict_upload("wall.png", blank_png(), Some(ALICE)).await;
    app.create_prediction(BOB).await;

    let count = app.get(routes::COUNT, Some(ALICE)).await;
    assert_eq!(count.body["count"], 3);

    let labels = app.get(routes::LABELS, Some(ALICE)).await;
    assert_eq!(labels.body["labels"], serde_json::json!(["cat", "dog"]));

    let stats = app.get(routes::STATS, Some(ALICE)).await;
    assert_eq!(stats.body["total_predictions"], 3);
    let avg = stats.body["average_confidence"].as_f64().unwrap();
    assert!((avg - 0.75).abs() < 1e-9, "{avg}");
    assert_eq!(
        stats.body["most_frequent_labels"],
        serde_json::json!([
            {"label": "cat", "count": 2},
            {"label": "dog", "count": 2},
        ])
    );
}

#[tokio::test]
async fn sessions_outside_the_window_are_ignored() {
    let app = TestApp::spawn().await;
    let old = app.create_prediction(ALICE).await;
    age_session(&app, &old, 8).await;

    let count = app.get(routes::COUNT, Some(ALICE)).await;
    assert_eq!(count.body["count"], 0);

    let stats = app.get(routes::STATS, Some(ALICE)).await;
    assert_eq!(stats.body["total_predictions"], 0);
    assert_eq!(stats.body["average_confidence"], 0.0);

    // Still readable directly; the window only scopes aggregates.
    let res = app.get(&routes::prediction(&old), Some(ALICE)).await;
    assert_eq!(res.status, 200);
}
