use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tracing::{debug, info, instrument};

use super::pool::SessionPool;
use super::{BoundingBox, Detection, Detector, load_labels};
use crate::config::DetectorConfig;

/// YOLOv8 detector over an ONNX export (`images` input, `[1, 4 + C, N]` output).
///
/// Sessions are checked out of a fixed pool for the duration of one inference,
/// so concurrent requests never share a session and never wait on each other's
/// locks.
pub struct YoloDetector {
    pool: SessionPool<Session>,
    labels: Arc<[String]>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        let sessions = config.sessions.max(1);
        let labels = load_labels(config.labels_path.as_deref())?;

        let pool = (0..sessions)
            .map(|_| build_session(&config.model_path))
            .collect::<Result<Vec<_>>>()
            .and_then(SessionPool::new)?;

        info!(
            model = %config.model_path.display(),
            sessions,
            classes = labels.len(),
            "Detector ready"
        );

        Ok(Self {
            pool,
            labels: labels.into(),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }
}

fn build_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(model_path)
        .with_context(|| format!("loading model {}", model_path.display()))
}

#[async_trait]
impl Detector for YoloDetector {
    #[instrument(skip(self), fields(path = %image_path.display()))]
    async fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let path = image_path.to_path_buf();
        let labels = Arc::clone(&self.labels);
        let params = Params {
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
        };

        let detections = self
            .pool
            .run_blocking(move |session| {
                image::open(&path)
                    .with_context(|| format!("decoding {}", path.display()))
                    .and_then(|img| run_inference(session, &img, &labels, params))
            })
            .await??;

        debug!(count = detections.len(), "Inference finished");
        Ok(detections)
    }
}

#[derive(Debug, Clone, Copy)]
struct Params {
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

fn run_inference(
    session: &mut Session,
    img: &DynamicImage,
    labels: &[String],
    params: Params,
) -> Result<Vec<Detection>> {
    let size = params.input_size;
    let (orig_width, orig_height) = img.dimensions();

    let resized = img.resize_exact(size, size, FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // NCHW, scaled to [0, 1]
    let plane = (size * size) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        input_data[idx] = pixel[0] as f32 / 255.0;
        input_data[plane + idx] = pixel[1] as f32 / 255.0;
        input_data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, size as usize, size as usize],
        input_data.into_boxed_slice(),
    ))?;

    let outputs = session.run(ort::inputs!["images" => input_tensor])?;
    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("model produced no output"))?;
    let (shape, data) = output.1.try_extract_tensor::<f32>()?;

    if shape.len() != 3 || shape[1] < 5 {
        return Err(anyhow!("unexpected output shape {shape:?}"));
    }
    let rows = shape[1] as usize;
    let anchors = shape[2] as usize;

    let scale_x = orig_width as f32 / size as f32;
    let scale_y = orig_height as f32 / size as f32;

    let candidates = decode_candidates(
        data,
        rows,
        anchors,
        params.confidence_threshold,
        (scale_x, scale_y),
        (orig_width as f32, orig_height as f32),
    );

    let kept = class_wise_nms(candidates, params.iou_threshold);

    Ok(kept
        .into_iter()
        .map(|c| Detection {
            label: labels
                .get(c.class)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", c.class)),
            score: c.score as f64,
            bbox: c.bbox,
        })
        .collect())
}

#[derive(Debug, Clone)]
struct Candidate {
    class: usize,
    score: f32,
    bbox: BoundingBox,
}

/// Read `[4 + C, N]` row-major output into thresholded candidates in source
/// pixel space.
fn decode_candidates(
    data: &[f32],
    rows: usize,
    anchors: usize,
    threshold: f32,
    (scale_x, scale_y): (f32, f32),
    (max_x, max_y): (f32, f32),
) -> Vec<Candidate> {
    let at = |row: usize, i: usize| data[row * anchors + i];
    let mut out = Vec::new();

    for i in 0..anchors {
        let (class, score) = (4..rows)
            .map(|r| (r - 4, at(r, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if score < threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let x1 = ((cx - w / 2.0) * scale_x).clamp(0.0, max_x);
        let y1 = ((cy - h / 2.0) * scale_y).clamp(0.0, max_y);
        let x2 = ((cx + w / 2.0) * scale_x).clamp(0.0, max_x);
        let y2 = ((cy + h / 2.0) * scale_y).clamp(0.0, max_y);

        out.push(Candidate {
            class,
            score,
            bbox: BoundingBox::from([x1 as f64, y1 as f64, x2 as f64, y2 as f64]),
        });
    }

    out
}

/// Greedy non-maximum suppression, applied independently per class.
fn class_wise_nms(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        let suppressed = keep
            .iter()
            .any(|k| k.class == cand.class && k.bbox.iou(&cand.bbox) > threshold as f64);
        if !suppressed {
            keep.push(cand);
        }
    }
    keep
}
