use crate::common::{STUB_LABELS, TestApp, blank_png, pattern_png, routes};

const ALICE: (&str, &str) = ("alice", "wonderland");

mod upload {
    use super::*;

    #[tokio::test]
    async fn authenticated_upload_is_stored_and_mirrored() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_upload("scene.png", pattern_png(), Some(ALICE))
            .await;

        assert_eq!(res.status, 200, "{}", res.text());
        let uid = res.body["prediction_uid"].as_str().unwrap();
        assert_eq!(res.body["username"], "alice");
        assert_eq!(res.body["detection_count"], 2);
        assert_eq!(res.body["labels"], serde_json::json!(STUB_LABELS));
        assert!(res.body["time_took"].as_f64().unwrap() >= 0.0);

        assert!(app.original_path(&format!("{uid}.png")).exists());
        assert!(app.predicted_path(&format!("{uid}.png")).exists());

        let mirror = &res.body["mirror"];
        assert_eq!(mirror["uploaded"], true, "{mirror}");
        assert_eq!(mirror["original_key"], format!("alice/original/{uid}.png"));
        assert_eq!(mirror["predicted_key"], format!("alice/predicted/{uid}.png"));
        assert!(mirror["error"].is_null());
    }

    #[tokio::test]
    async fn chat_id_replaces_owner_as_mirror_scope() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_upload_to(
                &format!("{}?chat_id=room42", routes::PREDICT),
                "scene.png",
                pattern_png(),
                Some(ALICE),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text());
        let key = res.body["mirror"]["original_key"].as_str().unwrap();
        assert!(key.starts_with("room42/original/"), "{key}");
    }

    #[tokio::test]
    async fn anonymous_upload_uses_anonymous_scope() {
        let app = TestApp::spawn().await;

        let res = app.predict_upload("scene.png", pattern_png(), None).await;

        assert_eq!(res.status, 200, "{}", res.text());
        assert!(res.body["username"].is_null());
        let key = res.body["mirror"]["predicted_key"].as_str().unwrap();
        assert!(key.starts_with("anonymous/predicted/"), "{key}");
    }

    #[tokio::test]
    async fn image_without_objects_yields_empty_session() {
        let app = TestApp::spawn().await;

        let res = app.predict_upload("wall.png", blank_png(), Some(ALICE)).await;

        assert_eq!(res.status, 200, "{}", res.text());
        assert_eq!(res.body["detection_count"], 0);
        assert_eq!(res.body["labels"], serde_json::json!([]));

        let uid = res.body["prediction_uid"].as_str().unwrap();
        let stored = app.get(&routes::prediction(uid), Some(ALICE)).await;
        assert_eq!(stored.status, 200);
        assert_eq!(stored.body["detection_objects"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_extension_defaults_to_jpg() {
        let app = TestApp::spawn().await;

        let res = app.predict_upload("scene", pattern_png(), Some(ALICE)).await;

        assert_eq!(res.status, 200, "{}", res.text());
        let uid = res.body["prediction_uid"].as_str().unwrap();
        assert!(app.original_path(&format!("{uid}.jpg")).exists());
        assert_eq!(
            res.body["mirror"]["predicted_key"],
            format!("alice/predicted/{uid}.jpg")
        );
    }

    #[tokio::test]
    async fn without_mirror_upload_still_succeeds() {
        let app = TestApp::spawn_with_mirror(false).await;

        let res = app
            .predict_upload("scene.png", pattern_png(), Some(ALICE))
            .await;

        assert_eq!(res.status, 200, "{}", res.text());
        assert!(res.body["mirror"].is_null());
    }

    #[tokio::test]
    async fn mirror_outage_keeps_the_session() {
        let app = TestApp::spawn_with_unreachable_mirror().await;

        let res = app
            .predict_upload("scene.png", pattern_png(), Some(ALICE))
            .await;

        assert_eq!(res.status, 200, "{}", res.text());
        let uid = res.body["prediction_uid"].as_str().unwrap();
        let mirror = &res.body["mirror"];
        assert_eq!(mirror["uploaded"], false, "{mirror}");
        assert_eq!(mirror["bucket"], "unreachable");
        assert!(mirror["error"].as_str().is_some_and(|e| !e.is_empty()));

        assert!(app.original_path(&format!("{uid}.png")).exists());
        assert!(app.predicted_path(&format!("{uid}.png")).exists());

        let saved = app.get(&routes::prediction(uid), Some(ALICE)).await;
        assert_eq!(saved.status, 200, "{}", saved.text());
        assert_eq!(saved.body["uid"], uid);
        assert_eq!(saved.body["detection_objects"].as_array().unwrap().len(), 2);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn undecodable_upload_leaves_nothing_behind() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_upload("notes.png", b"definitely not an image".to_vec(), Some(ALICE))
            .await;

        assert_eq!(res.status, 500);
        assert_eq!(res.code(), "PROCESSING_FAILED");
        assert!(app.scratch_files("original").is_empty());
        assert!(app.scratch_files("predicted").is_empty());

        let count = app.get(routes::COUNT, Some(ALICE)).await;
        assert_eq!(count.body["count"], 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.predict_upload("scene.png", vec![], Some(ALICE)).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert!(app.scratch_files("original").is_empty());
    }

    #[tokio::test]
    async fn neither_file_nor_key_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.predict_without_file("", Some(ALICE)).await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn both_file_and_key_are_rejected() {
        let app = TestApp::spawn().await;
        app.seed_mirror("inbox/scene.png", &pattern_png()).await;

        let res = app
            .predict_upload_to(
                &format!("{}?img=inbox/scene.png", routes::PREDICT),
                "scene.png",
                pattern_png(),
                Some(ALICE),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert!(app.scratch_files("original").is_empty());
    }

    #[tokio::test]
    async fn invalid_chat_id_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_upload_to(
                &format!("{}?chat_id=..", routes::PREDICT),
                "scene.png",
                pattern_png(),
                Some(ALICE),
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }
}

mod remote {
    use super::*;

    #[tokio::test]
    async fn mirrored_object_is_fetched_and_copied() {
        let app = TestApp::spawn().await;
        app.seed_mirror("inbox/scene.png", &pattern_png()).await;

        let res = app
            .predict_without_file("?img=inbox/scene.png", Some(ALICE))
            .await;

        assert_eq!(res.status, 200, "{}", res.text());
        assert_eq!(res.body["detection_count"], 2);
        let uid = res.body["prediction_uid"].as_str().unwrap();
        assert_eq!(
            res.body["mirror"]["original_key"],
            format!("alice/original/{uid}.png")
        );
        assert_eq!(res.body["mirror"]["uploaded"], true);
        assert!(app.original_path(&format!("{uid}.png")).exists());
    }

    #[tokio::test]
    async fn missing_object_is_404_and_stores_nothing() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_without_file("?img=inbox/ghost.png", Some(ALICE))
            .await;

        assert_eq!(res.status, 404);
        assert_eq!(res.code(), "NOT_FOUND");
        assert!(app.scratch_files("original").is_empty());

        let count = app.get(routes::COUNT, Some(ALICE)).await;
        assert_eq!(count.body["count"], 0);
    }

    #[tokio::test]
    async fn escaping_key_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .predict_without_file("?img=../secret.png", Some(ALICE))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn remote_ingestion_without_mirror_is_unavailable() {
        let app = TestApp::spawn_with_mirror(false).await;

        let res = app
            .predict_without_file("?img=inbox/scene.png", Some(ALICE))
            .await;

        assert_eq!(res.status, 500);
        assert_eq!(res.code(), "MIRROR_UNAVAILABLE");
    }
}
