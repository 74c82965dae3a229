use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{detection_object, prediction_session};
use crate::error::AppError;

/// Query parameters for `POST /predict`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PredictQuery {
    /// Key of an object in the mirror to run detection on instead of an upload.
    pub img: Option<String>,
    /// Scope that replaces the owner as the prefix of mirrored keys.
    pub chat_id: Option<String>,
}

/// Outcome of mirroring the original and annotated images.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MirrorReport {
    /// Bucket or root the objects were written to.
    #[schema(example = "detections")]
    pub bucket: String,
    #[schema(example = "alice/original/0b6c4a2e-6f5e-4c57-9a55-4f3a1c1d9e21.jpg")]
    pub original_key: String,
    #[schema(example = "alice/predicted/0b6c4a2e-6f5e-4c57-9a55-4f3a1c1d9e21.jpg")]
    pub predicted_key: String,
    /// Whether both objects were written.
    pub uploaded: bool,
    /// Failure detail when `uploaded` is false.
    pub error: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictResponse {
    #[schema(example = "0b6c4a2e-6f5e-4c57-9a55-4f3a1c1d9e21")]
    pub prediction_uid: String,
    /// `null` for anonymous requests.
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = 2)]
    pub detection_count: usize,
    /// One entry per detection, in detector order.
    #[schema(example = json!(["cat", "dog"]))]
    pub labels: Vec<String>,
    /// Wall-clock processing time in seconds.
    #[schema(example = 0.184)]
    pub time_took: f64,
    pub mirror: Option<MirrorReport>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DetectionObjectResponse {
    pub id: i32,
    #[schema(example = "cat")]
    pub label: String,
    #[schema(example = 0.91)]
    pub score: f64,
    /// `[x1, y1, x2, y2]` in source pixels.
    #[serde(rename = "box")]
    #[schema(example = json!([12.0, 40.5, 220.0, 310.25]))]
    pub bbox: [f64; 4],
}

impl TryFrom<detection_object::Model> for DetectionObjectResponse {
    type Error = AppError;

    fn try_from(model: detection_object::Model) -> Result<Self, Self::Error> {
        let bbox = serde_json::from_str(&model.bbox).map_err(|e| {
            AppError::Internal(format!("corrupt bbox on detection {}: {e}", model.id))
        })?;
        Ok(Self {
            id: model.id,
            label: model.label,
            score: model.score,
            bbox,
        })
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictionResponse {
    pub uid: String,
    pub timestamp: DateTime<Utc>,
    pub original_image: String,
    pub predicted_image: String,
    pub detection_objects: Vec<DetectionObjectResponse>,
}

impl PredictionResponse {
    pub fn new(
        session: prediction_session::Model,
        detections: Vec<detection_object::Model>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            uid: session.uid,
            timestamp: session.timestamp,
            original_image: session.original_image,
            predicted_image: session.predicted_image,
            detection_objects: detections
                .into_iter()
                .map(DetectionObjectResponse::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Entry in label/score listings.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PredictionSummary {
    pub uid: String,
    pub timestamp: DateTime<Utc>,
}

impl From<(String, DateTime<Utc>)> for PredictionSummary {
    fn from((uid, timestamp): (String, DateTime<Utc>)) -> Self {
        Self { uid, timestamp }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DeleteResponse {
    #[schema(example = "deleted")]
    pub status: String,
    pub uid: String,
}
