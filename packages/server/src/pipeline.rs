use std::path::{Path, PathBuf};
use std::time::Instant;

use axum::extract::multipart::Field;
use common::ObjectMirror;
use common::storage::{content_type_for, transfer, validate_key};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::detector::{Detection, annotate};
use crate::error::AppError;
use crate::models::prediction::{MirrorReport, PredictResponse};
use crate::state::AppState;
use crate::store::SessionStore;
use crate::utils::filename::{DEFAULT_EXTENSION, image_extension, validate_flat_filename};

/// Key prefix for mirrored outputs of anonymous requests without a chat scope.
const ANONYMOUS_SCOPE: &str = "anonymous";

/// Where the image for one ingestion comes from.
#[derive(Debug)]
pub enum ImageInput<U> {
    /// Multipart upload with its client-supplied filename.
    Upload { upload: U, filename: Option<String> },
    /// Object already in the mirror.
    Remote { key: String },
}

/// Enforce that exactly one source was given. Performs no I/O.
pub fn select_input<U>(
    upload: Option<(U, Option<String>)>,
    remote: Option<String>,
) -> Result<ImageInput<U>, AppError> {
    match (upload, remote) {
        (Some((upload, filename)), None) => Ok(ImageInput::Upload { upload, filename }),
        (None, Some(key)) => {
            validate_key(&key)?;
            Ok(ImageInput::Remote { key })
        }
        (Some(_), Some(_)) => Err(AppError::Validation(
            "Provide only one of: file OR img".into(),
        )),
        (None, None) => Err(AppError::Validation(
            "Provide a file upload or ?img=<key>".into(),
        )),
    }
}

/// Scratch files of one request. Removed on drop unless [`Scratch::keep`] ran,
/// which covers errors and client disconnects before the session is stored.
struct Scratch {
    original: PathBuf,
    predicted: PathBuf,
    keep: bool,
}

impl Scratch {
    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in [&self.original, &self.predicted] {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

/// End-to-end handling of one `POST /predict`.
pub struct IngestionPipeline<'a> {
    state: &'a AppState,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    #[instrument(skip(self, input), fields(uid))]
    pub async fn run(
        &self,
        owner: Option<&str>,
        chat_id: Option<&str>,
        input: ImageInput<Field<'_>>,
    ) -> Result<PredictResponse, AppError> {
        let started = Instant::now();

        let scope = match chat_id {
            Some(chat) => validate_flat_filename(chat)
                .map_err(|e| AppError::Validation(format!("chat_id: {}", e.message())))?,
            None => owner.unwrap_or(ANONYMOUS_SCOPE),
        };

        let remote_mirror = match &input {
            ImageInput::Remote { .. } => Some(self.mirror().ok_or_else(|| {
                AppError::MirrorUnavailable("Remote ingestion requires a configured mirror".into())
            })?),
            ImageInput::Upload { .. } => None,
        };

        let uid = Uuid::new_v4().to_string();
        tracing::Span::current().record("uid", uid.as_str());

        let ext = match &input {
            ImageInput::Upload { filename, .. } => filename
                .as_deref()
                .map(image_extension)
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            ImageInput::Remote { key } => image_extension(key),
        };

        let storage = &self.state.config.storage;
        let mut scratch = Scratch {
            original: storage.original_dir().join(format!("{uid}{ext}")),
            predicted: storage.predicted_dir().join(format!("{uid}{ext}")),
            keep: false,
        };

        let source_key = match input {
            ImageInput::Upload { upload, .. } => {
                write_upload(upload, &scratch.original).await?;
                None
            }
            ImageInput::Remote { key } => {
                let mirror = remote_mirror.ok_or_else(|| {
                    AppError::Internal("remote input without mirror".into())
                })?;
                let bytes = mirror.fetch(&key).await?;
                tokio::fs::write(&scratch.original, &bytes)
                    .await
                    .map_err(|e| AppError::Internal(format!("write scratch: {e}")))?;
                Some(key)
            }
        };

        let detections = self
            .state
            .detector
            .detect(&scratch.original)
            .await
            .map_err(|e| AppError::Processing(format!("{e:#}")))?;

        render_annotated(&scratch.original, &scratch.predicted, &detections).await?;

        let original_location = scratch.original.to_string_lossy().into_owned();
        let predicted_location = scratch.predicted.to_string_lossy().into_owned();
        // If the request is dropped after the commit lands but before `keep`,
        // `Scratch::drop` removes files the new rows point at. Readers treat
        // a missing file as 404 and deletion tolerates it.
        SessionStore::new(&self.state.db)
            .persist(
                &uid,
                &original_location,
                &predicted_location,
                owner,
                &detections,
            )
            .await?;
        scratch.keep();

        info!(
            owner = owner.unwrap_or("-"),
            detections = detections.len(),
            "Prediction stored"
        );

        let mirror = match self.mirror() {
            Some(mirror) => {
                let source_key = source_key.as_deref();
                Some(mirror_outputs(mirror, scope, &uid, &ext, source_key, &scratch).await)
            }
            None => None,
        };

        Ok(PredictResponse {
            prediction_uid: uid,
            username: owner.map(str::to_string),
            detection_count: detections.len(),
            labels: detections.into_iter().map(|d| d.label).collect(),
            time_took: started.elapsed().as_secs_f64(),
            mirror,
        })
    }

    fn mirror(&self) -> Option<&'a dyn ObjectMirror> {
        self.state.mirror.as_deref()
    }
}

async fn write_upload(mut field: Field<'_>, path: &Path) -> Result<(), AppError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Internal(format!("create scratch: {e}")))?;

    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e.body_text())))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("write scratch: {e}")))?;
        written += chunk.len();
    }
    file.flush()
        .await
        .map_err(|e| AppError::Internal(format!("flush scratch: {e}")))?;

    if written == 0 {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }
    Ok(())
}

async fn render_annotated(
    original: &Path,
    predicted: &Path,
    detections: &[Detection],
) -> Result<(), AppError> {
    let src = original.to_path_buf();
    let dst = predicted.to_path_buf();
    let dets = detections.to_vec();
    tokio::task::spawn_blocking(move || annotate(&src, &dst, &dets))
        .await
        .map_err(|e| AppError::Internal(format!("annotate task failed: {e}")))?
        .map_err(|e| AppError::Processing(format!("{e:#}")))
}

/// Copy both outputs to `{scope}/original/{uid}{ext}` and
/// `{scope}/predicted/{uid}{ext}`. Never fails the request; the outcome is
/// reported instead.
async fn mirror_outputs(
    mirror: &dyn ObjectMirror,
    scope: &str,
    uid: &str,
    ext: &str,
    source_key: Option<&str>,
    scratch: &Scratch,
) -> MirrorReport {
    let original_key = format!("{scope}/original/{uid}{ext}");
    let predicted_key = format!("{scope}/predicted/{uid}{ext}");

    let result = async {
        match source_key {
            Some(src) => transfer(mirror, src, &original_key).await?,
            None => upload_file(mirror, &scratch.original, &original_key).await?,
        }
        upload_file(mirror, &scratch.predicted, &predicted_key).await
    }
    .await;

    let error = match result {
        Ok(()) => None,
        Err(e) => {
            warn!(target = mirror.target(), error = %e, "Mirroring outputs failed");
            Some(e.to_string())
        }
    };

    MirrorReport {
        bucket: mirror.target().to_string(),
        original_key,
        predicted_key,
        uploaded: error.is_none(),
        error,
    }
}

async fn upload_file(
    mirror: &dyn ObjectMirror,
    path: &Path,
    key: &str,
) -> Result<(), common::MirrorError> {
    let data = tokio::fs::read(path).await?;
    mirror.store(&data, key, Some(&content_type_for(key))).await
}
