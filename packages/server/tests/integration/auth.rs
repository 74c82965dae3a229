use crate::common::{TestApp, pattern_png, routes};

const ALICE: (&str, &str) = ("alice", "wonderland");

mod auto_registration {
    use super::*;

    #[tokio::test]
    async fn first_request_registers_the_user() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::COUNT, Some(ALICE)).await;

        assert_eq!(res.status, 200, "{}", res.text());
        assert_eq!(res.body["count"], 0);
    }

    #[tokio::test]
    async fn same_credentials_keep_working() {
        let app = TestApp::spawn().await;

        for _ in 0..3 {
            let res = app.get(routes::COUNT, Some(ALICE)).await;
            assert_eq!(res.status, 200, "{}", res.text());
        }
    }

    #[tokio::test]
    async fn wrong_password_after_registration_is_rejected() {
        let app = TestApp::spawn().await;
        app.get(routes::COUNT, Some(ALICE)).await;

        let res = app.get(routes::COUNT, Some(("alice", "not-it"))).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn optional_endpoint_still_checks_supplied_credentials() {
        let app = TestApp::spawn().await;
        app.get(routes::COUNT, Some(ALICE)).await;

        let res = app
            .predict_upload("scene.png", pattern_png(), Some(("alice", "not-it")))
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "INVALID_CREDENTIALS");
        assert!(app.scratch_files("original").is_empty());
    }
}

mod request_validation {
    use super::*;

    #[tokio::test]
    async fn missing_header_on_required_endpoint_is_401() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::STATS, None).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "CREDENTIALS_MISSING");
    }

    #[tokio::test]
    async fn non_basic_scheme_is_401() {
        let app = TestApp::spawn().await;

        let res = app
            .get_with_header(routes::LABELS, "Authorization", "Bearer abc.def")
            .await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "CREDENTIALS_MISSING");
    }

    #[tokio::test]
    async fn undecodable_basic_payload_is_400() {
        let app = TestApp::spawn().await;

        let res = app
            .get_with_header(routes::LABELS, "Authorization", "Basic %%%not-base64%%%")
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "MALFORMED_CREDENTIALS");
    }

    #[tokio::test]
    async fn empty_username_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.get(routes::LABELS, Some(("", "secret"))).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.code(), "INVALID_CREDENTIALS");
    }
}
