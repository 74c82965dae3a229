use std::path::Path;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::path::AppPath;
use crate::state::AppState;
use crate::store::SessionStore;
use crate::utils::filename::validate_flat_filename;
use crate::utils::negotiate::negotiate_image;

/// Subdirectories of the upload area that may be served.
const IMAGE_KINDS: [&str; 2] = ["original", "predicted"];

#[utoipa::path(
    get,
    path = "/image/{type}/{filename}",
    tag = "Images",
    operation_id = "getImage",
    summary = "Download a stored original or annotated image",
    description = "Serves `{upload_dir}/{type}/{filename}` if it belongs to one of the caller's \
        sessions. The filename must be a bare name without separators.",
    params(
        ("type" = String, Path, description = "`original` or `predicted`"),
        ("filename" = String, Path, description = "Stored file name, e.g. `{uid}.jpg`"),
    ),
    responses(
        (status = 200, description = "Image bytes; content type guessed from the filename"),
        (status = 400, description = "Invalid type or filename (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 403, description = "Image belongs to someone else (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "No such file (NOT_FOUND)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user), fields(username = %auth_user.username))]
pub async fn get_image(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath((kind, filename)): AppPath<(String, String)>,
) -> Result<Response, AppError> {
    if !IMAGE_KINDS.contains(&kind.as_str()) {
        return Err(AppError::Validation("Invalid image type".into()));
    }
    let filename =
        validate_flat_filename(&filename).map_err(|e| AppError::Validation(e.message().into()))?;

    let path = state.config.storage.upload_dir.join(&kind).join(filename);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Image not found".into()));
    }

    let location = path.to_string_lossy();
    let owned = SessionStore::new(&state.db)
        .is_location_owned(&location, &auth_user.username)
        .await?;
    if !owned {
        return Err(AppError::PermissionDenied);
    }

    let content_type = mime_guess::from_path(&path).first_or_octet_stream();
    stream_file(&path, content_type.essence_str()).await
}

#[utoipa::path(
    get,
    path = "/prediction/{uid}/image",
    tag = "Images",
    operation_id = "getPredictionImage",
    summary = "Download the annotated image of a session",
    description = "The `Accept` header must list `image/png` or `image/jpeg` (`image/jpg` is \
        accepted as an alias). PNG wins when both are listed. Wildcards are not honoured.",
    params(("uid" = String, Path, description = "Prediction UID")),
    responses(
        (status = 200, description = "Annotated image as `image/png` or `image/jpeg`"),
        (status = 401, description = "Unauthorized (CREDENTIALS_MISSING, INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 404, description = "Not found, not owned, or file missing (NOT_FOUND)", body = ErrorBody),
        (status = 406, description = "No acceptable image type (NOT_ACCEPTABLE)", body = ErrorBody),
    ),
    security(("basic" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(username = %auth_user.username))]
pub async fn get_prediction_image(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(uid): AppPath<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = SessionStore::new(&state.db)
        .get_session(&uid, &auth_user.username)
        .await?
        .ok_or_else(|| AppError::NotFound("Prediction not found or not authorized".into()))?;

    let path = Path::new(&session.predicted_image);
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(AppError::NotFound("Predicted image file not found".into()));
    }

    let content_type = negotiate_image(&headers)
        .content_type()
        .ok_or(AppError::NotAcceptable)?;
    stream_file(path, content_type).await
}

async fn stream_file(path: &Path, content_type: &str) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound("Image not found".into()),
        _ => AppError::Internal(format!("IO error: {e}")),
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("IO error: {e}")))?
        .len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
