use axum::{Json, extract::State};
use tracing::{instrument, warn};

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::path::AppPath;
use crate::models::prediction::{DeleteResponse, PredictionResponse, PredictionSummary};
use crate::state::AppState;
use crate::store::SessionStore;

const NOT_FOUND_MSG: &str = "Prediction not found or not authorized";

#[utoipa::path(
    get,
    path = "/prediction/{uid}",
    tag = "Predictions",
    operation_id = "getPrediction",
    summary = "Get a prediction session with its detections",
    description = "Only the owner can read a session. Sessions owned by someone else, and \
        anonymous sessions, are reported as not found.",
    params(("uid" = String, Path, description = "Prediction UID")),
    responses(
        (status = 200, description = "Session and detections", body = PredictionResponse),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 404, description = "Not found or not owned (NOT_FOUND)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn get_prediction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(uid): AppPath<String>,
) -> Result<Json<PredictionResponse>, AppError> {
    let store = SessionStore::new(&state.db);
    let session = store
        .get_session(&uid, &auth_user.username)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND_MSG.into()))?;
    let detections = store.get_detections(&uid).await?;

    Ok(Json(PredictionResponse::new(session, detections)?))
}

#[utoipa::path(
    delete,
    path = "/prediction/{uid}",
    tag = "Predictions",
    operation_id = "deletePrediction",
    summary = "Delete a prediction session",
    description = "Removes the session and all its detections, then deletes the stored image \
        files. File removal is best-effort.",
    params(("uid" = String, Path, description = "Prediction UID")),
    responses(
        (status = 200, description = "Deleted", body = DeleteResponse),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 404, description = "Not found or not owned (NOT_FOUND)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn delete_prediction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(uid): AppPath<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let (original, predicted) = SessionStore::new(&state.db)
        .delete_session(&uid, &auth_user.username)
        .await?
        .ok_or_else(|| AppError::NotFound("Prediction not found".into()))?;

    for path in [original, predicted] {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path, error = %e, "Failed to delete image file"),
        }
    }

    Ok(Json(DeleteResponse {
        status: "deleted".into(),
        uid,
    }))
}

#[utoipa::path(
    get,
    path = "/predictions/label/{label}",
    tag = "Predictions",
    operation_id = "listPredictionsByLabel",
    summary = "List own sessions containing a label",
    params(("label" = String, Path, description = "Detection label, e.g. `person`")),
    responses(
        (status = 200, description = "Matching sessions, newest first", body = Vec<PredictionSummary>),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn predictions_by_label(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(label): AppPath<String>,
) -> Result<Json<Vec<PredictionSummary>>, AppError> {
    let rows = SessionStore::new(&state.db)
        .list_by_label(&label, &auth_user.username)
        .await?;
    Ok(Json(rows.into_iter().map(PredictionSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/predictions/score/{min_score}",
    tag = "Predictions",
    operation_id = "listPredictionsByScore",
    summary = "List own sessions with a detection at or above a score",
    params(("min_score" = f64, Path, description = "Minimum detection score")),
    responses(
        (status = 200, description = "Matching sessions, newest first", body = Vec<PredictionSummary>),
        (status = 400, description = "Score is not a finite number (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn predictions_by_score(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(min_score): AppPath<f64>,
) -> Result<Json<Vec<PredictionSummary>>, AppError> {
    if !min_score.is_finite() {
        return Err(AppError::Validation("min_score must be a finite number".into()));
    }

    let rows = SessionStore::new(&state.db)
        .list_by_score(min_score, &auth_user.username)
        .await?;
    Ok(Json(rows.into_iter().map(PredictionSummary::from).collect()))
}
