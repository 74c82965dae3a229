use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use common::{MirrorError, ObjectMirror};
use common::storage::filesystem::FilesystemMirror;
use image::{ImageFormat, ImageReader, Rgb, RgbImage};
use reqwest::{Client, RequestBuilder};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tempfile::TempDir;

use server::config::{
    AppConfig, CorsConfig, DatabaseConfig, DetectorConfig, ServerConfig, StatsConfig,
    StorageConfig,
};
use server::detector::{BoundingBox, Detection, Detector};
use server::state::AppState;

pub mod routes {
    pub const PREDICT: &str = "/predict";
    pub const COUNT: &str = "/predictions/count";
    pub const LABELS: &str = "/labels";
    pub const STATS: &str = "/stats";
    pub const HEALTH: &str = "/health";

    pub fn prediction(uid: &str) -> String {
        format!("/prediction/{uid}")
    }

    pub fn prediction_image(uid: &str) -> String {
        format!("/prediction/{uid}/image")
    }

    pub fn by_label(label: &str) -> String {
        format!("/predictions/label/{label}")
    }

    pub fn by_score(min_score: &str) -> String {
        format!("/predictions/score/{min_score}")
    }

    pub fn image(kind: &str, filename: &str) -> String {
        format!("/image/{kind}/{filename}")
    }
}

/// Detector double: a single-colour image has nothing in it, anything else
/// that decodes holds a cat and a dog, and undecodable input is an error.
pub struct StubDetector;

pub const STUB_LABELS: [&str; 2] = ["cat", "dog"];

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, image_path: &Path) -> anyhow::Result<Vec<Detection>> {
        let img = ImageReader::open(image_path)?
            .with_guessed_format()?
            .decode()?
            .to_rgb8();
        let first = img.get_pixel(0, 0);
        if img.pixels().all(|p| p == first) {
            return Ok(vec![]);
        }
        Ok(vec![
            Detection {
                label: STUB_LABELS[0].into(),
                score: 0.9,
                bbox: BoundingBox::from([1.0, 1.0, 10.0, 10.0]),
            },
            Detection {
                label: STUB_LABELS[1].into(),
                score: 0.6,
                bbox: BoundingBox::from([4.0, 2.0, 14.0, 12.0]),
            },
        ])
    }
}

/// Mirror double whose store is unreachable: every call fails remotely.
pub struct UnreachableMirror;

#[async_trait]
impl ObjectMirror for UnreachableMirror {
    fn target(&self) -> &str {
        "unreachable"
    }

    async fn exists(&self, _key: &str) -> Result<bool, MirrorError> {
        Err(MirrorError::Remote("connection refused".into()))
    }

    async fn fetch(&self, _key: &str) -> Result<Vec<u8>, MirrorError> {
        Err(MirrorError::Remote("connection refused".into()))
    }

    async fn store(
        &self,
        _data: &[u8],
        _key: &str,
        _content_type: Option<&str>,
    ) -> Result<(), MirrorError> {
        Err(MirrorError::Remote("connection refused".into()))
    }

    async fn copy(&self, _source: &str, _dest: &str) -> Result<(), MirrorError> {
        Err(MirrorError::Remote("connection refused".into()))
    }
}

/// A running test server.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub upload_dir: PathBuf,
    pub mirror: Option<Arc<FilesystemMirror>>,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Raw response body.
    pub bytes: Vec<u8>,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestApp {
    /// Spawn with a filesystem mirror configured.
    pub async fn spawn() -> Self {
        Self::spawn_with_mirror(true).await
    }

    pub async fn spawn_with_mirror(with_mirror: bool) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mirror = if with_mirror {
            Some(Arc::new(
                FilesystemMirror::new(dir.path().join("mirror"))
                    .await
                    .expect("Failed to create mirror"),
            ))
        } else {
            None
        };
        let dyn_mirror = mirror.clone().map(|m| m as Arc<dyn ObjectMirror>);
        Self::spawn_in(dir, mirror, dyn_mirror).await
    }

    /// Spawn with a mirror that rejects every request.
    pub async fn spawn_with_unreachable_mirror() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mirror: Arc<dyn ObjectMirror> = Arc::new(UnreachableMirror);
        Self::spawn_in(dir, None, Some(mirror)).await
    }

    async fn spawn_in(
        dir: TempDir,
        mirror: Option<Arc<FilesystemMirror>>,
        dyn_mirror: Option<Arc<dyn ObjectMirror>>,
    ) -> Self {
        let upload_dir = dir.path().join("uploads");

        let app_config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors: CorsConfig {
                    allow_origins: vec![],
                    max_age: 3600,
                },
                max_upload_size: 4 * 1024 * 1024,
            },
            database: DatabaseConfig {
                url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
                max_connections: 5,
            },
            storage: StorageConfig {
                upload_dir: upload_dir.clone(),
            },
            detector: DetectorConfig {
                model_path: PathBuf::from("unused.onnx"),
                confidence_threshold: 0.25,
                iou_threshold: 0.45,
                input_size: 640,
                sessions: 1,
                labels_path: None,
            },
            stats: StatsConfig { window_days: 7 },
            mirror: None,
        };

        for sub in [
            app_config.storage.original_dir(),
            app_config.storage.predicted_dir(),
        ] {
            std::fs::create_dir_all(sub).expect("Failed to create upload dirs");
        }

        let db = server::database::init_db(
            &app_config.database.url,
            app_config.database.max_connections,
        )
        .await
        .expect("Failed to initialize test database");

        let state = AppState {
            db: db.clone(),
            config: Arc::new(app_config),
            detector: Arc::new(StubDetector),
            mirror: dyn_mirror,
        };

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            upload_dir,
            mirror,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn authed(req: RequestBuilder, creds: Option<(&str, &str)>) -> RequestBuilder {
        match creds {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    pub async fn get(&self, path: &str, creds: Option<(&str, &str)>) -> TestResponse {
        let req = Self::authed(self.client.get(self.url(path)), creds);
        let res = req.send().await.expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn get_with_accept(
        &self,
        path: &str,
        creds: (&str, &str),
        accept: &str,
    ) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .basic_auth(creds.0, Some(creds.1))
            .header("Accept", accept)
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn get_with_header(&self, path: &str, name: &str, value: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header(name, value)
            .send()
            .await
            .expect("Failed to send GET request");
        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str, creds: (&str, &str)) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .basic_auth(creds.0, Some(creds.1))
            .send()
            .await
            .expect("Failed to send DELETE request");
        TestResponse::from_response(res).await
    }

    /// `POST /predict` with a multipart `file` part.
    pub async fn predict_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        creds: Option<(&str, &str)>,
    ) -> TestResponse {
        self.predict_upload_to(routes::PREDICT, file_name, bytes, creds)
            .await
    }

    pub async fn predict_upload_to(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
        creds: Option<(&str, &str)>,
    ) -> TestResponse {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let req = Self::authed(self.client.post(self.url(path)), creds).multipart(form);
        let res = req.send().await.expect("Failed to send multipart upload");
        TestResponse::from_response(res).await
    }

    /// `POST /predict` with no body parts, for remote ingestion via `?img=`.
    pub async fn predict_without_file(
        &self,
        query: &str,
        creds: Option<(&str, &str)>,
    ) -> TestResponse {
        let form = reqwest::multipart::Form::new().text("note", "no file here");
        let url = format!("{}{query}", self.url(routes::PREDICT));
        let req = Self::authed(self.client.post(url), creds).multipart(form);
        let res = req.send().await.expect("Failed to send predict request");
        TestResponse::from_response(res).await
    }

    /// Upload a detectable image as `creds` and return the prediction uid.
    pub async fn create_prediction(&self, creds: (&str, &str)) -> String {
        let res = self
            .predict_upload("scene.png", pattern_png(), Some(creds))
            .await;
        assert_eq!(res.status, 200, "predict failed: {}", res.text());
        res.body["prediction_uid"]
            .as_str()
            .expect("response should carry prediction_uid")
            .to_string()
    }

    /// Put an object straight into the mirror.
    pub async fn seed_mirror(&self, key: &str, bytes: &[u8]) {
        self.mirror
            .as_ref()
            .expect("mirror not configured")
            .store(bytes, key, Some("image/png"))
            .await
            .expect("Failed to seed mirror");
    }

    pub fn original_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join("original").join(filename)
    }

    pub fn predicted_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join("predicted").join(filename)
    }

    /// Files currently in `{upload_dir}/{kind}`.
    pub fn scratch_files(&self, kind: &str) -> Vec<String> {
        std::fs::read_dir(self.upload_dir.join(kind))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = res.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Self {
            status,
            content_type,
            bytes,
            body,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("Failed to encode PNG");
    buf
}

/// A 16x16 single-colour PNG; the stub detector finds nothing in it.
pub fn blank_png() -> Vec<u8> {
    encode_png(RgbImage::from_pixel(16, 16, Rgb([200, 200, 200])))
}

/// A 16x16 gradient PNG; the stub detector finds a cat and a dog.
pub fn pattern_png() -> Vec<u8> {
    encode_png(RgbImage::from_fn(16, 16, |x, y| {
        Rgb([(x * 16) as u8, (y * 16) as u8, 128])
    }))
}
