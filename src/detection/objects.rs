// src/detection/objects.rs

use super::{iou, letterbox_chw, ObjectDetector};
use crate::types::{DetectionBox, LabeledDetection, RasterImage};
use anyhow::Result;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_ANCHORS: usize = 8400;
const YOLO_CLASSES: usize = 80;
const YOLO_NMS_IOU: f32 = 0.45;

#[rustfmt::skip]
const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train",
    "truck", "boat", "traffic light", "fire hydrant", "stop sign",
    "parking meter", "bench", "bird", "cat", "dog", "horse", "sheep", "cow",
    "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella", "handbag",
    "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard",
    "tennis racket", "bottle", "wine glass", "cup", "fork", "knife", "spoon",
    "bowl", "banana", "apple", "sandwich", "orange", "broccoli", "carrot",
    "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
    "hair drier", "toothbrush",
];

/// Multi-object detector with classification (YOLOv8 COCO head:
/// [1, 84, 8400] output). Returns every class above threshold; the
/// redaction stage does its own vocabulary filtering.
pub struct OnnxObjectDetector {
    session: Session,
    confidence_threshold: f32,
}

impl OnnxObjectDetector {
    pub fn new(model_path: &str, confidence_threshold: f32, num_threads: usize) -> Result<Self> {
        info!("Loading object model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)?;

        info!("✓ Object detector initialized");
        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    fn postprocess(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
    ) -> Vec<LabeledDetection> {
        let mut detections: Vec<(DetectionBox, usize)> = Vec::new();

        for i in 0..YOLO_ANCHORS {
            let mut max_conf = 0.0f32;
            let mut best_class = 0;
            for c in 0..YOLO_CLASSES {
                let conf = output[YOLO_ANCHORS * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < self.confidence_threshold {
                continue;
            }

            let cx = output[i];
            let cy = output[YOLO_ANCHORS + i];
            let w = output[YOLO_ANCHORS * 2 + i];
            let h = output[YOLO_ANCHORS * 3 + i];

            let bbox = DetectionBox::new(
                (cx - w / 2.0 - pad_x) / scale,
                (cy - h / 2.0 - pad_y) / scale,
                (cx + w / 2.0 - pad_x) / scale,
                (cy + h / 2.0 - pad_y) / scale,
                max_conf,
            );
            detections.push((bbox, best_class));
        }

        // Per-class NMS so a car and an overlapping truck both survive
        detections.sort_by(|a, b| b.0.confidence.partial_cmp(&a.0.confidence).unwrap());
        let mut keep: Vec<(DetectionBox, usize)> = Vec::new();
        for (bbox, class_id) in detections {
            let suppressed = keep
                .iter()
                .any(|(k, kc)| *kc == class_id && iou(k, &bbox) >= YOLO_NMS_IOU);
            if !suppressed {
                keep.push((bbox, class_id));
            }
        }

        keep.into_iter()
            .map(|(bbox, class_id)| LabeledDetection {
                bbox,
                labels: vec![COCO_LABELS[class_id].to_string()],
            })
            .collect()
    }
}

impl ObjectDetector for OnnxObjectDetector {
    fn detect(&mut self, image: &RasterImage) -> Result<Vec<LabeledDetection>> {
        let (input, scale, pad_x, pad_y) = letterbox_chw(image, YOLO_INPUT_SIZE);
        let output = self.infer(&input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}
