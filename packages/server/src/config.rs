use std::path::PathBuf;

use common::MirrorConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
    /// Maximum accepted request body for uploads, in bytes.
    pub max_upload_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the local scratch area.
    pub upload_dir: PathBuf,
}

impl StorageConfig {
    pub fn original_dir(&self) -> PathBuf {
        self.upload_dir.join("original")
    }

    pub fn predicted_dir(&self) -> PathBuf {
        self.upload_dir.join("predicted")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Number of inference sessions kept warm.
    pub sessions: usize,
    /// Newline-separated class names; COCO-80 when unset.
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// Trailing window for count/label/stat queries.
    pub window_days: i64,
}

impl StatsConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(self.window_days)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub detector: DetectorConfig,
    pub stats: StatsConfig,
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("server.max_upload_size", 16 * 1024 * 1024)?
            .set_default("database.url", "sqlite://predictions.db?mode=rwc")?
            .set_default("database.max_connections", 20)?
            .set_default("storage.upload_dir", "uploads")?
            .set_default("detector.model_path", "models/yolov8n.onnx")?
            .set_default("detector.confidence_threshold", 0.25)?
            .set_default("detector.iou_threshold", 0.45)?
            .set_default("detector.input_size", 640)?
            .set_default("detector.sessions", 2)?
            .set_default("stats.window_days", 7)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., VISION__MIRROR__BUCKET)
            .add_source(Environment::with_prefix("VISION").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
