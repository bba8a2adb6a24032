// src/detection/mod.rs
//
// Detector boundary contracts plus the preprocessing/postprocessing
// helpers shared by the ONNX-backed implementations.

mod face;
mod objects;
mod text;

pub use face::OnnxFaceDetector;
pub use objects::OnnxObjectDetector;
pub use text::OnnxTextRecognizer;

use crate::types::{DetectionBox, LabeledDetection, RasterImage, TextLine};
use anyhow::Result;

// ============================================================================
// BOUNDARY CONTRACTS
// ============================================================================

pub trait FaceDetector {
    fn detect(&mut self, image: &RasterImage) -> Result<Vec<DetectionBox>>;
}

pub trait ObjectDetector {
    fn detect(&mut self, image: &RasterImage) -> Result<Vec<LabeledDetection>>;
}

pub trait TextRecognizer {
    fn recognize(&mut self, image: &RasterImage) -> Result<Vec<TextLine>>;
}

// ============================================================================
// SHARED PRE/POST-PROCESSING
// ============================================================================

/// Letterbox an RGB raster into a square CHW f32 tensor normalized to [0, 1].
/// Returns (tensor, scale, pad_x, pad_y) so detections can be mapped back
/// to original image coordinates.
pub(crate) fn letterbox_chw(
    image: &RasterImage,
    target_size: usize,
) -> (Vec<f32>, f32, f32, f32) {
    let src_w = image.width;
    let src_h = image.height;

    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(&image.data, src_w, src_h, scaled_w, scaled_h);

    // Gray canvas, resized image centered
    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_x = x + pad_x as usize;
            let dst_y = y + pad_y as usize;
            let dst_idx = (dst_y * target_size + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    // [0, 255] -> [0, 1], HWC -> CHW
    let mut input = vec![0.0f32; 3 * target_size * target_size];
    for c in 0..3 {
        for h in 0..target_size {
            for w in 0..target_size {
                let hwc_idx = (h * target_size + w) * 3 + c;
                let chw_idx = c * target_size * target_size + h * target_size + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

pub(crate) fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

pub(crate) fn nms(mut boxes: Vec<DetectionBox>, iou_threshold: f32) -> Vec<DetectionBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    let mut keep = Vec::new();
    while !boxes.is_empty() {
        let current = boxes.remove(0);
        boxes.retain(|b| iou(&current, b) < iou_threshold);
        keep.push(current);
    }
    keep
}

pub(crate) fn iou(a: &DetectionBox, b: &DetectionBox) -> f32 {
    let x1 = a.left.max(b.left);
    let y1 = a.top.max(b.top);
    let x2 = a.right.min(b.right);
    let y2 = a.bottom.min(b.bottom);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width() * a.height() + b.width() * b.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_boxes() {
        let b = DetectionBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = DetectionBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = DetectionBox::new(20.0, 20.0, 30.0, 30.0, 1.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let boxes = vec![
            DetectionBox::new(0.0, 0.0, 10.0, 10.0, 0.9),
            DetectionBox::new(1.0, 1.0, 11.0, 11.0, 0.7),
            DetectionBox::new(50.0, 50.0, 60.0, 60.0, 0.8),
        ];
        let kept = nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_letterbox_shape() {
        let img = RasterImage::new(100, 50);
        let (tensor, scale, pad_x, pad_y) = letterbox_chw(&img, 640);
        assert_eq!(tensor.len(), 3 * 640 * 640);
        assert!((scale - 6.4).abs() < 1e-5);
        assert_eq!(pad_x, 0.0);
        assert_eq!(pad_y, 160.0);
    }
}
