// src/config.rs

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
models:
  face_model: models/face.onnx
  object_model: models/yolov8n.onnx
  text_detection_model: models/text_det.onnx
  text_recognition_model: models/text_rec.onnx
  segmentation_model: models/sidewalk_seg.onnx
  num_threads: 4
redaction:
  face_confidence_threshold: 0.5
  object_confidence_threshold: 0.4
  text_box_threshold: 0.3
online:
  vision_endpoint: https://example.cognitiveservices.example.com
  vision_key: key-a
  chat_endpoint: https://example.openai.example.com/chat/completions
  chat_key: key-b
  timeout_secs: 60
report:
  input_dir: input
  output_dir: output
  use_metric: true
  default_online: false
  latitude: 0.0
  longitude: 0.0
logging:
  level: info
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.models.num_threads, 4);
        assert!(config.report.use_metric);
        assert!(!config.report.default_online);
        assert_eq!(config.online.timeout_secs, 60);
    }
}
