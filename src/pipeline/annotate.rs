use std::collections::BTreeMap;

use opencv::core::{Mat, Point, Rect, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::detect::Detection;

/// Resize to the target width, preserving aspect ratio. Deterministic and
/// stateless so tiles from the same device stay comparably sized.
pub fn normalize_width(frame: &Mat, width: i32) -> opencv::Result<Mat> {
    let size = frame.size()?;
    if size.width == width || size.width == 0 {
        return frame.try_clone();
    }

    let height = ((size.height as f64 * width as f64 / size.width as f64).round() as i32).max(1);
    let mut resized = Mat::default();
    imgproc::resize(
        frame,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

/// Integer pixel rectangle for a detection, clamped to the frame bounds.
pub fn detection_rect(det: &Detection, bounds: Size) -> Rect {
    let x = det.x.clamp(0.0, bounds.width as f32) as i32;
    let y = det.y.clamp(0.0, bounds.height as f32) as i32;
    let width = (det.width as i32).min(bounds.width - x).max(0);
    let height = (det.height as i32).min(bounds.height - y).max(0);
    Rect::new(x, y, width, height)
}

pub fn draw_box(frame: &mut Mat, rect: Rect) -> opencv::Result<()> {
    imgproc::rectangle(
        frame,
        rect,
        Scalar::new(255.0, 0.0, 0.0, 0.0),
        2,
        imgproc::LINE_8,
        0,
    )
}

/// Device name top-left, per-class counts along the bottom edge.
pub fn overlay_labels(
    frame: &mut Mat,
    device_id: &str,
    counts: &BTreeMap<String, u32>,
) -> opencv::Result<()> {
    imgproc::put_text(
        frame,
        device_id,
        Point::new(10, 25),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        Scalar::new(0.0, 0.0, 255.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;

    let summary = counts
        .iter()
        .map(|(class, count)| format!("{class}: {count}"))
        .collect::<Vec<_>>()
        .join(", ");
    let height = frame.size()?.height;
    imgproc::put_text(
        frame,
        &summary,
        Point::new(10, height - 20),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        Scalar::new(0.0, 255.0, 0.0, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;

    #[test]
    fn normalization_preserves_aspect_ratio() {
        let frame =
            Mat::new_rows_cols_with_default(600, 800, CV_8UC3, Scalar::all(40.0)).unwrap();
        let normalized = normalize_width(&frame, 400).unwrap();
        assert_eq!(normalized.size().unwrap(), Size::new(400, 300));
    }

    #[test]
    fn normalization_at_target_width_copies_unchanged() {
        let frame =
            Mat::new_rows_cols_with_default(240, 400, CV_8UC3, Scalar::all(40.0)).unwrap();
        let normalized = normalize_width(&frame, 400).unwrap();
        assert_eq!(normalized.size().unwrap(), Size::new(400, 240));
    }

    #[test]
    fn detection_rect_clamps_to_frame_bounds() {
        let det = Detection {
            class_name: "person".to_string(),
            confidence: 0.9,
            x: 380.0,
            y: 290.0,
            width: 100.0,
            height: 100.0,
        };
        let rect = detection_rect(&det, Size::new(400, 300));
        assert!(rect.x + rect.width <= 400);
        assert!(rect.y + rect.height <= 300);
        assert!(rect.width >= 0 && rect.height >= 0);
    }
}
