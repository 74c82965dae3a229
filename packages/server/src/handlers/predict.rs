use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::MultipartRejection, rejection::QueryRejection},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::MaybeAuthUser;
use crate::models::prediction::{PredictQuery, PredictResponse};
use crate::pipeline::{IngestionPipeline, select_input};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/predict",
    tag = "Predictions",
    operation_id = "predict",
    summary = "Run object detection on an image",
    description = "Accepts either a multipart upload in the `file` field or `?img=<key>` naming an \
        object in the configured mirror, never both. Authentication is optional: without an \
        `Authorization` header the session is stored anonymously and cannot be read back later. \
        When a mirror is configured the original and annotated images are copied to \
        `{chat_id|username|anonymous}/original/{uid}{ext}` and `.../predicted/...`; a mirror \
        failure is reported in `mirror.error` and does not fail the request.",
    params(PredictQuery),
    request_body(content_type = "multipart/form-data", description = "Image upload in field `file`"),
    responses(
        (status = 200, description = "Detection stored", body = PredictResponse),
        (status = 400, description = "No input, both inputs, or bad key (VALIDATION_ERROR, MALFORMED_CREDENTIALS)", body = ErrorBody),
        (status = 401, description = "Credentials supplied but wrong (INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 404, description = "Remote object not found (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Mirror misconfigured or image unprocessable (MIRROR_UNAVAILABLE, PROCESSING_FAILED)", body = ErrorBody),
    ),
    security((), ("basic" = [])),
)]
#[instrument(skip(state, user, query, multipart), fields(username = user.username()))]
pub async fn predict(
    user: MaybeAuthUser,
    State(state): State<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let remote = query.img.filter(|k| !k.is_empty());
    let chat_id = query.chat_id.as_deref().filter(|c| !c.is_empty());
    let pipeline = IngestionPipeline::new(&state);

    // Anything that is not a multipart body counts as "no upload".
    if let Ok(mut multipart) = multipart {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {}", e.body_text())))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let filename = field.file_name().map(str::to_string);
            let input = select_input(Some((field, filename)), remote)?;
            return pipeline
                .run(user.username(), chat_id, input)
                .await
                .map(Json);
        }
    }

    let input = select_input(None, remote)?;
    pipeline
        .run(user.username(), chat_id, input)
        .await
        .map(Json)
}
