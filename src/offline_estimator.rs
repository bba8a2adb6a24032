// src/offline_estimator.rs
//
// Offline hazard estimation from the on-device segmentation network.
// Per-pixel arg-max over 21 classes feeds two scene ratios; the ratios
// map to the report through fixed linear constants. The constants are
// part of the report contract and are never re-derived.

use crate::error::EstimationError;
use crate::segmentation::{SegmentationModel, MODEL_SIZE, NUM_CLASSES};
use crate::types::{AnalysisMode, HazardReport, PrivacyStats, RasterImage};
use tracing::{debug, info};

/// Class 0 is walkable ground surface.
const WALKABLE_CLASS: usize = 0;

/// Classes that indicate an indoor scene; their ratio rejects
/// out-of-domain images.
const INDOOR_CLASSES: [usize; 5] = [5, 9, 11, 18, 20];

/// Indoor ratio above this short-circuits to an invalid-environment report.
const INDOOR_REJECT_RATIO: f32 = 0.10;

/// Surface ratio above this reports no obstruction.
const CLEAR_SURFACE_RATIO: f32 = 0.6;

/// Linear ratio-to-dimension constants (meters at multiplier 1.0).
const BREADTH_FACTOR: f64 = 3.0;
const LENGTH_FACTOR: f64 = 20.0;
const FEET_PER_METER: f64 = 3.28;

pub struct OfflineHazardEstimator {
    /// None when the model failed to load at startup; estimation then
    /// reports ModelUnavailable instead of crashing the workflow.
    model: Option<SegmentationModel>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneRatios {
    pub surface_ratio: f32,
    pub indoor_ratio: f32,
}

impl OfflineHazardEstimator {
    pub fn new(model: Option<SegmentationModel>) -> Self {
        Self { model }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn estimate(
        &mut self,
        image: &RasterImage,
        stats: PrivacyStats,
        use_metric: bool,
    ) -> Result<HazardReport, EstimationError> {
        let model = self
            .model
            .as_mut()
            .ok_or(EstimationError::ModelUnavailable)?;

        let scores = model
            .run(image)
            .map_err(|e| EstimationError::Segmentation(e.to_string()))?;
        if scores.len() < MODEL_SIZE * MODEL_SIZE * NUM_CLASSES {
            return Err(EstimationError::Segmentation(format!(
                "segmentation output too small: {} scores",
                scores.len()
            )));
        }

        let ratios = classify_pixels(&scores);
        info!(
            "Offline analysis: surface_ratio={:.3}, indoor_ratio={:.3}",
            ratios.surface_ratio, ratios.indoor_ratio
        );

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let text = compose_report(ratios, stats, use_metric, &timestamp);
        Ok(HazardReport::new(text, AnalysisMode::Offline))
    }
}

/// Per-pixel arg-max with strict-greater replacement: the lowest class
/// index wins ties. Counts walkable and indoor pixels into scene ratios.
pub(crate) fn classify_pixels(scores: &[f32]) -> SceneRatios {
    let total_pixels = MODEL_SIZE * MODEL_SIZE;
    let mut road_pixels = 0usize;
    let mut indoor_pixels = 0usize;

    for i in 0..total_pixels {
        let mut max_val = f32::NEG_INFINITY;
        let mut max_idx = usize::MAX;
        for c in 0..NUM_CLASSES {
            let v = scores[i * NUM_CLASSES + c];
            if v > max_val {
                max_val = v;
                max_idx = c;
            }
        }
        if max_idx == WALKABLE_CLASS {
            road_pixels += 1;
        }
        if INDOOR_CLASSES.contains(&max_idx) {
            indoor_pixels += 1;
        }
    }

    debug!(
        "Segmentation counts: road={}, indoor={}, total={}",
        road_pixels, indoor_pixels, total_pixels
    );

    SceneRatios {
        surface_ratio: road_pixels as f32 / total_pixels as f32,
        indoor_ratio: indoor_pixels as f32 / total_pixels as f32,
    }
}

/// Build the fixed-section report text. Formats are part of the export
/// contract and must stay byte-stable.
pub(crate) fn compose_report(
    ratios: SceneRatios,
    stats: PrivacyStats,
    use_metric: bool,
    timestamp: &str,
) -> String {
    if ratios.indoor_ratio > INDOOR_REJECT_RATIO {
        return format!(
            "1. AI Notes: Indoor detected.\n\
             2. Issue: Invalid Env\n\
             3. Confidence: 0%\n\
             4. Privacy: {} faces, {} plates.\n\
             5. Time: {}",
            stats.faces, stats.plates, timestamp
        );
    }

    let multiplier = if use_metric { 1.0 } else { FEET_PER_METER };
    let unit_name = if use_metric { "meters" } else { "feet" };

    let ratio = ratios.surface_ratio;
    let raw_breadth = if ratio > 0.0 {
        ratio as f64 * BREADTH_FACTOR
    } else {
        0.0
    };
    let raw_length = if ratio > 0.0 {
        ratio as f64 * LENGTH_FACTOR
    } else {
        0.0
    };
    let est_breadth = raw_breadth * multiplier;
    let est_length = raw_length * multiplier;

    let confidence = ((ratio * 100.0) as i32).clamp(0, 99);
    let issue = if ratio > CLEAR_SURFACE_RATIO {
        "None"
    } else {
        "Obstruction"
    };

    format!(
        "=== WalkSafe AI Report (Offline) ===\n\
         1. AI Notes: Pixel segmentation complete.\n\
         2. Identified Issue: {}\n\
         3. Est Length: {:.1} {}\n\
         4. Est Breadth: {:.1} {}\n\
         5. AI Confidence: {}%\n\
         6. Privacy: {} faces, {} plates\n\
         7. Time: {}",
        issue, est_length, unit_name, est_breadth, unit_name, confidence, stats.faces,
        stats.plates, timestamp
    )
}

// ============================================================================
// TESTS
// ============================================================================
