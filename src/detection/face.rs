// src/detection/face.rs

use super::{letterbox_chw, nms, FaceDetector};
use crate::types::{DetectionBox, RasterImage};
use anyhow::Result;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const FACE_INPUT_SIZE: usize = 640;
const FACE_ANCHORS: usize = 8400;
const FACE_NMS_IOU: f32 = 0.45;

/// Single-class face detector (YOLOv8-face head: [1, 5, 8400] output,
/// rows cx/cy/w/h/confidence). Accuracy-prioritized: no early exit, full
/// anchor scan plus NMS.
pub struct OnnxFaceDetector {
    session: Session,
    confidence_threshold: f32,
}

impl OnnxFaceDetector {
    pub fn new(model_path: &str, confidence_threshold: f32, num_threads: usize) -> Result<Self> {
        info!("Loading face model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        info!("✓ Face detector initialized");
        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, FACE_INPUT_SIZE, FACE_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, image: &RasterImage) -> Result<Vec<DetectionBox>> {
        let (input, scale, pad_x, pad_y) = letterbox_chw(image, FACE_INPUT_SIZE);
        let output = self.infer(&input)?;

        let mut boxes = Vec::new();
        for i in 0..FACE_ANCHORS {
            let conf = output[FACE_ANCHORS * 4 + i];
            if conf < self.confidence_threshold {
                continue;
            }

            let cx = output[i];
            let cy = output[FACE_ANCHORS + i];
            let w = output[FACE_ANCHORS * 2 + i];
            let h = output[FACE_ANCHORS * 3 + i];

            // Center format -> corners, then reverse the letterbox transform
            boxes.push(DetectionBox::new(
                (cx - w / 2.0 - pad_x) / scale,
                (cy - h / 2.0 - pad_y) / scale,
                (cx + w / 2.0 - pad_x) / scale,
                (cy + h / 2.0 - pad_y) / scale,
                conf,
            ));
        }

        let boxes = nms(boxes, FACE_NMS_IOU);
        debug!("Detected {} faces", boxes.len());
        Ok(boxes)
    }
}
