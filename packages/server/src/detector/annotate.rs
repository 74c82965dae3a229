use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};

use super::Detection;

const STROKE: u32 = 2;

const PALETTE: [[u8; 3]; 6] = [
    [230, 25, 75],
    [60, 180, 75],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [255, 225, 25],
];

/// Write a copy of `src` to `dst` with every detection outlined.
///
/// The copy keeps the source's sniffed format when the encoder supports it and
/// falls back to PNG otherwise.
pub fn annotate(src: &Path, dst: &Path, detections: &[Detection]) -> Result<()> {
    let reader = ImageReader::open(src)
        .with_context(|| format!("opening {}", src.display()))?
        .with_guessed_format()
        .with_context(|| format!("sniffing {}", src.display()))?;
    let format = reader.format();
    let img = reader
        .decode()
        .with_context(|| format!("decoding {}", src.display()))?;

    let mut canvas = img.to_rgb8();
    for det in detections {
        draw_box(&mut canvas, det, color_for(&det.label));
    }
    let out = DynamicImage::ImageRgb8(canvas);

    let saved = match format {
        Some(fmt) => out.save_with_format(dst, fmt),
        None => out.save_with_format(dst, ImageFormat::Png),
    };
    if let Err(e) = saved {
        tracing::debug!(error = %e, "Re-encoding in source format failed, writing PNG");
        out.save_with_format(dst, ImageFormat::Png)
            .with_context(|| format!("writing {}", dst.display()))?;
    }

    Ok(())
}

fn color_for(label: &str) -> Rgb<u8> {
    let idx = label.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    Rgb(PALETTE[idx % PALETTE.len()])
}

fn draw_box(canvas: &mut RgbImage, det: &Detection, color: Rgb<u8>) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp_x = |v: f64| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f64| (v.max(0.0) as u32).min(h - 1);

    let (x1, y1) = (clamp_x(det.bbox.x1), clamp_y(det.bbox.y1));
    let (x2, y2) = (clamp_x(det.bbox.x2), clamp_y(det.bbox.y2));

    for t in 0..STROKE {
        for x in x1..=x2 {
            canvas.put_pixel(x, (y1 + t).min(h - 1), color);
            canvas.put_pixel(x, y2.saturating_sub(t), color);
        }
        for y in y1..=y2 {
            canvas.put_pixel((x1 + t).min(w - 1), y, color);
            canvas.put_pixel(x2.saturating_sub(t), y, color);
        }
    }
}
