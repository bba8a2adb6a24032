// src/types.rs

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: ModelsConfig,
    pub redaction: RedactionConfig,
    pub online: OnlineConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub face_model: String,
    pub object_model: String,
    pub text_detection_model: String,
    pub text_recognition_model: String,
    pub segmentation_model: String,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    pub face_confidence_threshold: f32,
    pub object_confidence_threshold: f32,
    pub text_box_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineConfig {
    pub vision_endpoint: String,
    pub vision_key: String,
    pub chat_endpoint: String,
    pub chat_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub use_metric: bool,
    pub default_online: bool,
    /// Fallback coordinates attached to exported reports when the caller
    /// supplies none (in the app the device GPS fills these in).
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// CORE DATA MODEL
// ============================================================================

/// Mutable RGB raster. Dimensions are fixed for the lifetime of the buffer;
/// only pixel content changes (redaction paints over it).
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// Row-major RGB bytes, stride 3.
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl RasterImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0u8; width * height * 3],
            width,
            height,
        }
    }

    /// Paint an opaque black rectangle, clamped to the image bounds.
    /// Inverted or fully out-of-range rectangles paint nothing.
    pub fn fill_rect_black(&mut self, rect: &DetectionBox) {
        let x0 = rect.left.max(0.0) as usize;
        let y0 = rect.top.max(0.0) as usize;
        let x1 = rect.right.min(self.width as f32).max(0.0) as usize;
        let y1 = rect.bottom.min(self.height as f32).max(0.0) as usize;

        for y in y0..y1.min(self.height) {
            let row = y * self.width;
            for x in x0..x1.min(self.width) {
                let idx = (row + x) * 3;
                self.data[idx] = 0;
                self.data[idx + 1] = 0;
                self.data[idx + 2] = 0;
            }
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let idx = (y * self.width + x) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// Axis-aligned detection rectangle in original image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub confidence: f32,
}

impl DetectionBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32, confidence: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
            confidence,
        }
    }

    /// Strict geometric intersection (touching edges do not count).
    pub fn intersects(&self, other: &DetectionBox) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Grow the box outward by `margin` pixels on every side.
    pub fn expand(&self, margin: f32) -> DetectionBox {
        DetectionBox {
            left: self.left - margin,
            top: self.top - margin,
            right: self.right + margin,
            bottom: self.bottom + margin,
            confidence: self.confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Object detection with classification labels attached.
#[derive(Debug, Clone)]
pub struct LabeledDetection {
    pub bbox: DetectionBox,
    pub labels: Vec<String>,
}

/// A recognized text line: box plus content. Transient; only used to decide
/// plate-likeness during redaction.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub bbox: DetectionBox,
    pub text: String,
}

/// Redaction counts for one pass. Immutable once produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrivacyStats {
    pub faces: u32,
    pub plates: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    Online,
    Offline,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Online => "ONLINE",
            AnalysisMode::Offline => "OFFLINE",
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final structured result handed to the upload/export collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct HazardReport {
    pub text: String,
    pub mode: AnalysisMode,
    pub created_at_ms: i64,
}

impl HazardReport {
    pub fn new(text: String, mode: AnalysisMode) -> Self {
        Self {
            text,
            mode,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_intersection() {
        let vehicle = DetectionBox::new(10.0, 10.0, 100.0, 100.0, 0.9);
        let line = DetectionBox::new(20.0, 20.0, 40.0, 30.0, 0.8);
        assert!(vehicle.intersects(&line));
        assert!(line.intersects(&vehicle));

        let far = DetectionBox::new(200.0, 200.0, 250.0, 250.0, 0.8);
        assert!(!vehicle.intersects(&far));
    }

    #[test]
    fn test_touching_edges_do_not_intersect() {
        let a = DetectionBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = DetectionBox::new(10.0, 0.0, 20.0, 10.0, 1.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_expand_grows_every_side() {
        let b = DetectionBox::new(20.0, 20.0, 40.0, 30.0, 0.8).expand(5.0);
        assert_eq!(b.left, 15.0);
        assert_eq!(b.top, 15.0);
        assert_eq!(b.right, 45.0);
        assert_eq!(b.bottom, 35.0);
    }

    #[test]
    fn test_fill_rect_clamps_to_bounds() {
        let mut img = RasterImage::new(10, 10);
        img.data.fill(255);
        img.fill_rect_black(&DetectionBox::new(-5.0, -5.0, 5.0, 5.0, 1.0));
        assert_eq!(img.pixel(0, 0), [0, 0, 0]);
        assert_eq!(img.pixel(4, 4), [0, 0, 0]);
        assert_eq!(img.pixel(5, 5), [255, 255, 255]);
        assert_eq!(img.width, 10);
        assert_eq!(img.height, 10);
    }
}
