use serde::Serialize;

use crate::store::{LabelCount, RecentStats};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CountResponse {
    #[schema(example = 12)]
    pub count: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LabelsResponse {
    #[schema(example = json!(["cat", "dog", "person"]))]
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LabelFrequency {
    #[schema(example = "person")]
    pub label: String,
    #[schema(example = 7)]
    pub count: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    /// Sessions created in the window.
    pub total_predictions: u64,
    /// Mean detection score in the window; `0.0` when there were no detections.
    pub average_confidence: f64,
    /// Up to five labels, most frequent first.
    pub most_frequent_labels: Vec<LabelFrequency>,
}

impl From<RecentStats> for StatsResponse {
    fn from(stats: RecentStats) -> Self {
        Self {
            total_predictions: stats.count,
            average_confidence: stats.avg_score,
            most_frequent_labels: stats
                .top_labels
                .into_iter()
                .map(|LabelCount { label, count }| LabelFrequency { label, count })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}
