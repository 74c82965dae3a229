use std::sync::Arc;

use common::ObjectMirror;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::detector::Detector;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub detector: Arc<dyn Detector>,
    /// `None` when no mirror target is configured.
    pub mirror: Option<Arc<dyn ObjectMirror>>,
}
