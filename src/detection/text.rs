// src/detection/text.rs
//
// Two-stage text line recognizer: a DB-style detection model proposes
// line boxes from a probability map, a CTC recognition model reads each
// crop. Only boxes and content are surfaced; the redaction stage decides
// what is plate-like.

use super::{resize_bilinear, TextRecognizer};
use crate::types::{DetectionBox, RasterImage, TextLine};
use anyhow::Result;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const DET_INPUT_SIZE: usize = 640;
const REC_INPUT_H: usize = 48;
const REC_INPUT_W: usize = 320;
const MIN_COMPONENT_AREA: usize = 10;
const MIN_BOX_SIDE: f32 = 3.0;
const MAX_CANDIDATES: usize = 1000;

/// CTC alphabet; model blank token is index 0, characters start at 1.
const CHARSET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz .-:/";

pub struct OnnxTextRecognizer {
    det_session: Session,
    rec_session: Session,
    box_threshold: f32,
}

impl OnnxTextRecognizer {
    pub fn new(
        det_model_path: &str,
        rec_model_path: &str,
        box_threshold: f32,
        num_threads: usize,
    ) -> Result<Self> {
        info!(
            "Loading text models: det={} rec={}",
            det_model_path, rec_model_path
        );

        let det_session = build_session(det_model_path, num_threads)?;
        let rec_session = build_session(rec_model_path, num_threads)?;

        info!("✓ Text recognizer initialized");
        Ok(Self {
            det_session,
            rec_session,
            box_threshold,
        })
    }

    /// Run the detection model and return the flat probability map.
    fn detect_map(&mut self, image: &RasterImage) -> Result<Vec<f32>> {
        let resized = resize_bilinear(
            &image.data,
            image.width,
            image.height,
            DET_INPUT_SIZE,
            DET_INPUT_SIZE,
        );

        // HWC -> CHW, normalize to [-1, 1]
        let mut input = vec![0.0f32; 3 * DET_INPUT_SIZE * DET_INPUT_SIZE];
        for c in 0..3 {
            for h in 0..DET_INPUT_SIZE {
                for w in 0..DET_INPUT_SIZE {
                    let hwc_idx = (h * DET_INPUT_SIZE + w) * 3 + c;
                    let chw_idx = c * DET_INPUT_SIZE * DET_INPUT_SIZE + h * DET_INPUT_SIZE + w;
                    input[chw_idx] = (resized[hwc_idx] as f32 / 255.0 - 0.5) / 0.5;
                }
            }
        }

        let shape = [1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.det_session.run(ort::inputs!["x" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    /// Read one box. The crop is resized to the recognition model's fixed
    /// input and greedily CTC-decoded.
    fn recognize_box(&mut self, image: &RasterImage, bbox: &DetectionBox) -> Result<String> {
        let x0 = bbox.left.max(0.0) as usize;
        let y0 = bbox.top.max(0.0) as usize;
        let x1 = (bbox.right as usize).min(image.width).max(x0 + 1);
        let y1 = (bbox.bottom as usize).min(image.height).max(y0 + 1);

        let crop_w = x1 - x0;
        let crop_h = y1 - y0;
        let mut crop = vec![0u8; crop_w * crop_h * 3];
        for y in 0..crop_h {
            let src = ((y0 + y) * image.width + x0) * 3;
            let dst = y * crop_w * 3;
            crop[dst..dst + crop_w * 3].copy_from_slice(&image.data[src..src + crop_w * 3]);
        }

        let resized = resize_bilinear(&crop, crop_w, crop_h, REC_INPUT_W, REC_INPUT_H);

        let mut input = vec![0.0f32; 3 * REC_INPUT_H * REC_INPUT_W];
        for c in 0..3 {
            for h in 0..REC_INPUT_H {
                for w in 0..REC_INPUT_W {
                    let hwc_idx = (h * REC_INPUT_W + w) * 3 + c;
                    let chw_idx = c * REC_INPUT_H * REC_INPUT_W + h * REC_INPUT_W + w;
                    input[chw_idx] = (resized[hwc_idx] as f32 / 255.0 - 0.5) / 0.5;
                }
            }
        }

        let shape = [1, 3, REC_INPUT_H, REC_INPUT_W];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.rec_session.run(ort::inputs!["x" => input_value])?;
        let (out_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        // [1, T, C] logits
        let steps = out_shape[1] as usize;
        let classes = out_shape[2] as usize;
        Ok(ctc_greedy_decode(data, steps, classes))
    }
}

impl TextRecognizer for OnnxTextRecognizer {
    fn recognize(&mut self, image: &RasterImage) -> Result<Vec<TextLine>> {
        let prob_map = self.detect_map(image)?;

        let scale_x = image.width as f32 / DET_INPUT_SIZE as f32;
        let scale_y = image.height as f32 / DET_INPUT_SIZE as f32;

        let boxes = boxes_from_prob_map(
            &prob_map,
            DET_INPUT_SIZE,
            DET_INPUT_SIZE,
            self.box_threshold,
        );

        let mut lines = Vec::new();
        for b in boxes.into_iter().take(MAX_CANDIDATES) {
            let bbox = DetectionBox::new(
                b.left * scale_x,
                b.top * scale_y,
                b.right * scale_x,
                b.bottom * scale_y,
                b.confidence,
            );
            let text = self.recognize_box(image, &bbox)?;
            if !text.trim().is_empty() {
                lines.push(TextLine { bbox, text });
            }
        }

        debug!("Recognized {} text lines", lines.len());
        Ok(lines)
    }
}

fn build_session(model_path: &str, num_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(num_threads)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Threshold the probability map and grow 4-connected components into
/// axis-aligned boxes. Tiny components are noise and get dropped.
pub(crate) fn boxes_from_prob_map(
    prob_map: &[f32],
    width: usize,
    height: usize,
    threshold: f32,
) -> Vec<DetectionBox> {
    let mut binary = vec![false; width * height];
    for (i, &p) in prob_map.iter().take(width * height).enumerate() {
        binary[i] = p > threshold;
    }

    let mut visited = vec![false; width * height];
    let mut boxes = Vec::new();
    let mut stack = Vec::new();

    for start in 0..width * height {
        if !binary[start] || visited[start] {
            continue;
        }

        let (mut min_x, mut min_y) = (width, height);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut area = 0usize;
        let mut score_sum = 0.0f32;

        stack.push(start);
        visited[start] = true;

        while let Some(idx) = stack.pop() {
            let x = idx % width;
            let y = idx / width;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            area += 1;
            score_sum += prob_map[idx];

            if x > 0 && binary[idx - 1] && !visited[idx - 1] {
                visited[idx - 1] = true;
                stack.push(idx - 1);
            }
            if x + 1 < width && binary[idx + 1] && !visited[idx + 1] {
                visited[idx + 1] = true;
                stack.push(idx + 1);
            }
            if y > 0 && binary[idx - width] && !visited[idx - width] {
                visited[idx - width] = true;
                stack.push(idx - width);
            }
            if y + 1 < height && binary[idx + width] && !visited[idx + width] {
                visited[idx + width] = true;
                stack.push(idx + width);
            }
        }

        if area < MIN_COMPONENT_AREA {
            continue;
        }

        let bbox = DetectionBox::new(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
            score_sum / area as f32,
        );
        if bbox.width() < MIN_BOX_SIDE || bbox.height() < MIN_BOX_SIDE {
            continue;
        }
        boxes.push(bbox);
    }

    boxes
}

/// Greedy CTC decode: per step arg-max, collapse repeats, drop blanks.
pub(crate) fn ctc_greedy_decode(logits: &[f32], steps: usize, classes: usize) -> String {
    let chars: Vec<char> = CHARSET.chars().collect();
    let mut out = String::new();
    let mut prev = 0usize;

    for t in 0..steps {
        let row = &logits[t * classes..(t + 1) * classes];
        let mut best = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for (c, &score) in row.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best = c;
            }
        }

        if best != 0 && best != prev {
            if let Some(&ch) = chars.get(best - 1) {
                out.push(ch);
            }
        }
        prev = best;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boxes_from_prob_map_finds_blob() {
        let (w, h) = (20, 20);
        let mut map = vec![0.0f32; w * h];
        for y in 5..10 {
            for x in 3..15 {
                map[y * w + x] = 0.9;
            }
        }

        let boxes = boxes_from_prob_map(&map, w, h, 0.3);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.left, 3.0);
        assert_eq!(b.top, 5.0);
        assert_eq!(b.right, 15.0);
        assert_eq!(b.bottom, 10.0);
    }

    #[test]
    fn test_boxes_from_prob_map_drops_noise() {
        let (w, h) = (20, 20);
        let mut map = vec![0.0f32; w * h];
        map[5 * w + 5] = 0.9; // single pixel, below MIN_COMPONENT_AREA
        assert!(boxes_from_prob_map(&map, w, h, 0.3).is_empty());
    }

    #[test]
    fn test_ctc_decode_collapses_repeats_and_blanks() {
        // Charset index 1 = '0', 2 = '1', ...; class 0 is blank.
        let classes = CHARSET.len() + 1;
        let steps = 5;
        let mut logits = vec![0.0f32; steps * classes];
        // "A" (index 11 in charset -> class 12), repeated, then blank, then "1"
        let a_class = 1 + CHARSET.find('A').unwrap();
        let one_class = 1 + CHARSET.find('1').unwrap();
        logits[a_class] = 5.0; // t=0: A
        logits[classes + a_class] = 5.0; // t=1: A (repeat, collapsed)
        logits[2 * classes] = 5.0; // t=2: blank
        logits[3 * classes + a_class] = 5.0; // t=3: A (new emission)
        logits[4 * classes + one_class] = 5.0; // t=4: 1

        assert_eq!(ctc_greedy_decode(&logits, steps, classes), "AA1");
    }
}
