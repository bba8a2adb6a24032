// src/redaction.rs
//
// Privacy redaction pass: paints opaque black rectangles over detected
// faces and license-plate-like text lines before any image leaves the
// device. Detector failures degrade that category to zero redactions
// instead of aborting — a broken detector must never block hazard
// reporting, so the caller still gets whatever was painted.

use crate::detection::{FaceDetector, ObjectDetector, TextRecognizer};
use crate::types::{DetectionBox, PrivacyStats, RasterImage, TextLine};
use tracing::{debug, warn};

/// Outward growth applied to plate-like boxes before painting, covering
/// box-detection slack around the physical plate.
const PLATE_MARGIN_PX: f32 = 5.0;

/// Object labels treated as vehicles (case-insensitive match).
const VEHICLE_LABELS: [&str; 4] = ["car", "vehicle", "truck", "bus"];

/// Text lines of this length that contain a digit are plate-like even
/// without a vehicle box behind them.
const PLATE_TEXT_LEN: std::ops::RangeInclusive<usize> = 4..=12;

pub struct RedactionEngine {
    faces: Option<Box<dyn FaceDetector>>,
    objects: Option<Box<dyn ObjectDetector>>,
    text: Option<Box<dyn TextRecognizer>>,
}

impl RedactionEngine {
    /// A `None` detector means that category was unavailable at startup
    /// (model missing); it contributes zero redactions.
    pub fn new(
        faces: Option<Box<dyn FaceDetector>>,
        objects: Option<Box<dyn ObjectDetector>>,
        text: Option<Box<dyn TextRecognizer>>,
    ) -> Self {
        Self {
            faces,
            objects,
            text,
        }
    }

    /// Paint over faces and plate-like text lines in place. Dimensions are
    /// untouched; only pixel content changes.
    pub fn redact(&mut self, image: &mut RasterImage) -> PrivacyStats {
        let mut stats = PrivacyStats::default();

        // Faces: every returned box is painted and counted, overlapping or not.
        if let Some(detector) = self.faces.as_mut() {
            match detector.detect(image) {
                Ok(boxes) => {
                    for bbox in &boxes {
                        image.fill_rect_black(bbox);
                        stats.faces += 1;
                    }
                }
                Err(e) => warn!("Face detector failed, skipping face redaction: {}", e),
            }
        }

        // Vehicles feed the plate overlap rule; a failure here only weakens
        // that rule, the lexical heuristic still applies.
        let vehicle_boxes: Vec<DetectionBox> = match self.objects.as_mut() {
            Some(detector) => match detector.detect(image) {
                Ok(detections) => detections
                    .into_iter()
                    .filter(|d| {
                        d.labels
                            .iter()
                            .any(|l| VEHICLE_LABELS.contains(&l.to_lowercase().as_str()))
                    })
                    .map(|d| d.bbox)
                    .collect(),
                Err(e) => {
                    warn!("Object detector failed, no vehicle regions: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let Some(recognizer) = self.text.as_mut() {
            match recognizer.recognize(image) {
                Ok(lines) => {
                    for line in &lines {
                        if is_plate_like(line, &vehicle_boxes) {
                            image.fill_rect_black(&line.bbox.expand(PLATE_MARGIN_PX));
                            stats.plates += 1;
                        }
                    }
                }
                Err(e) => warn!("Text recognizer failed, skipping plate redaction: {}", e),
            }
        }

        debug!(
            "Redaction complete: {} faces, {} plates",
            stats.faces, stats.plates
        );
        stats
    }
}

/// A line is plate-like if it overlaps a vehicle region, or its content
/// looks like a plate number (4-12 chars with at least one digit).
fn is_plate_like(line: &TextLine, vehicle_boxes: &[DetectionBox]) -> bool {
    vehicle_boxes.iter().any(|v| v.intersects(&line.bbox)) || is_plate_like_text(&line.text)
}

fn is_plate_like_text(text: &str) -> bool {
    PLATE_TEXT_LEN.contains(&text.chars().count()) && text.chars().any(|c| c.is_ascii_digit())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabeledDetection;
    use anyhow::{anyhow, Result};

    struct FixedFaces(Vec<DetectionBox>);
    impl FaceDetector for FixedFaces {
        fn detect(&mut self, _image: &RasterImage) -> Result<Vec<DetectionBox>> {
            Ok(self.0.clone())
        }
    }

    struct FixedObjects(Vec<LabeledDetection>);
    impl ObjectDetector for FixedObjects {
        fn detect(&mut self, _image: &RasterImage) -> Result<Vec<LabeledDetection>> {
            Ok(self.0.clone())
        }
    }

    struct FixedText(Vec<TextLine>);
    impl TextRecognizer for FixedText {
        fn recognize(&mut self, _image: &RasterImage) -> Result<Vec<TextLine>> {
            Ok(self.0.clone())
        }
    }

    struct FailingFaces;
    impl FaceDetector for FailingFaces {
        fn detect(&mut self, _image: &RasterImage) -> Result<Vec<DetectionBox>> {
            Err(anyhow!("face model crashed"))
        }
    }

    fn white_image(w: usize, h: usize) -> RasterImage {
        let mut img = RasterImage::new(w, h);
        img.data.fill(255);
        img
    }

    fn vehicle(l: f32, t: f32, r: f32, b: f32) -> LabeledDetection {
        LabeledDetection {
            bbox: DetectionBox::new(l, t, r, b, 0.9),
            labels: vec!["Car".to_string()],
        }
    }

    fn line(l: f32, t: f32, r: f32, b: f32, text: &str) -> TextLine {
        TextLine {
            bbox: DetectionBox::new(l, t, r, b, 0.8),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_nothing_detected_leaves_raster_untouched() {
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![]))),
            Some(Box::new(FixedObjects(vec![]))),
            Some(Box::new(FixedText(vec![]))),
        );
        let mut img = white_image(50, 50);
        let original = img.data.clone();

        let stats = engine.redact(&mut img);

        assert_eq!(stats, PrivacyStats { faces: 0, plates: 0 });
        assert_eq!(img.data, original);
    }

    #[test]
    fn test_faces_painted_and_counted_without_dedup() {
        // Two overlapping faces still count as two.
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![
                DetectionBox::new(10.0, 10.0, 30.0, 30.0, 0.9),
                DetectionBox::new(15.0, 15.0, 35.0, 35.0, 0.8),
            ]))),
            Some(Box::new(FixedObjects(vec![]))),
            Some(Box::new(FixedText(vec![]))),
        );
        let mut img = white_image(50, 50);

        let stats = engine.redact(&mut img);

        assert_eq!(stats.faces, 2);
        assert_eq!(img.pixel(20, 20), [0, 0, 0]);
        assert_eq!(img.pixel(34, 34), [0, 0, 0]);
        assert_eq!(img.pixel(40, 40), [255, 255, 255]);
    }

    #[test]
    fn test_digit_heuristic_marks_plate_without_vehicle() {
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![]))),
            Some(Box::new(FixedObjects(vec![]))),
            Some(Box::new(FixedText(vec![line(20.0, 20.0, 40.0, 30.0, "AB1234")]))),
        );
        let mut img = white_image(60, 60);

        let stats = engine.redact(&mut img);

        assert_eq!(stats.plates, 1);
        // Painted region is the line box grown by 5px per side
        assert_eq!(img.pixel(16, 16), [0, 0, 0]); // inside expanded box
        assert_eq!(img.pixel(44, 34), [0, 0, 0]);
        assert_eq!(img.pixel(12, 12), [255, 255, 255]); // outside it
    }

    #[test]
    fn test_vehicle_overlap_marks_non_platelike_text() {
        // "STOP" fails the lexical heuristic but sits on a vehicle.
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![]))),
            Some(Box::new(FixedObjects(vec![vehicle(10.0, 10.0, 100.0, 100.0)]))),
            Some(Box::new(FixedText(vec![line(20.0, 20.0, 40.0, 30.0, "STOP")]))),
        );
        let mut img = white_image(120, 120);

        let stats = engine.redact(&mut img);
        assert_eq!(stats.plates, 1);
    }

    #[test]
    fn test_both_rules_matching_redacts_once() {
        // Vehicle at (10,10,100,100), line (20,20,40,30) "AB1234": both
        // the overlap rule and the lexical heuristic match.
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![]))),
            Some(Box::new(FixedObjects(vec![vehicle(10.0, 10.0, 100.0, 100.0)]))),
            Some(Box::new(FixedText(vec![line(20.0, 20.0, 40.0, 30.0, "AB1234")]))),
        );
        let mut img = white_image(120, 120);

        let stats = engine.redact(&mut img);
        assert_eq!(stats.plates, 1);
    }

    #[test]
    fn test_non_vehicle_labels_do_not_create_regions() {
        let bench = LabeledDetection {
            bbox: DetectionBox::new(10.0, 10.0, 100.0, 100.0, 0.9),
            labels: vec!["bench".to_string()],
        };
        let mut engine = RedactionEngine::new(
            Some(Box::new(FixedFaces(vec![]))),
            Some(Box::new(FixedObjects(vec![bench]))),
            Some(Box::new(FixedText(vec![line(20.0, 20.0, 40.0, 30.0, "STOP")]))),
        );
        let mut img = white_image(120, 120);

        let stats = engine.redact(&mut img);
        assert_eq!(stats.plates, 0);
    }

    #[test]
    fn test_failed_face_detector_degrades_only_faces() {
        let mut engine = RedactionEngine::new(
            Some(Box::new(FailingFaces)),
            Some(Box::new(FixedObjects(vec![]))),
            Some(Box::new(FixedText(vec![line(20.0, 20.0, 40.0, 30.0, "XY99")]))),
        );
        let mut img = white_image(60, 60);

        let stats = engine.redact(&mut img);

        assert_eq!(stats.faces, 0);
        assert_eq!(stats.plates, 1);
    }

    #[test]
    fn test_plate_text_heuristic_bounds() {
        assert!(is_plate_like_text("AB12")); // 4 chars, has digit
        assert!(is_plate_like_text("ABCDEFGHIJK9")); // 12 chars
        assert!(!is_plate_like_text("A1")); // too short
        assert!(!is_plate_like_text("ABCDEFGHIJKL9")); // 13 chars
        assert!(!is_plate_like_text("ROADWORK")); // no digit
    }
}
