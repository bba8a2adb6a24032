// src/pipeline.rs
//
// Orchestration: redact once, dispatch to exactly one estimator, hand
// back (report, redacted image, stats). No retries here — the caller
// re-invokes with the same redacted image if it wants another attempt.
// Estimator errors are folded into the report text so nothing from the
// core ever reaches the caller as an unhandled failure.

use crate::error::EstimationError;
use crate::offline_estimator::OfflineHazardEstimator;
use crate::online_estimator::OnlineHazardEstimator;
use crate::redaction::RedactionEngine;
use crate::types::{AnalysisMode, HazardReport, PrivacyStats, RasterImage};
use tracing::{info, warn};

pub struct ReportPipeline {
    redaction: RedactionEngine,
    offline: OfflineHazardEstimator,
    online: OnlineHazardEstimator,
}

/// Everything the caller needs after one pass: the report, the redacted
/// raster (dimensions unchanged) and the redaction counts.
pub struct ReportOutcome {
    pub report: HazardReport,
    pub image: RasterImage,
    pub stats: PrivacyStats,
}

impl ReportPipeline {
    pub fn new(
        redaction: RedactionEngine,
        offline: OfflineHazardEstimator,
        online: OnlineHazardEstimator,
    ) -> Self {
        Self {
            redaction,
            offline,
            online,
        }
    }

    pub async fn process(
        &mut self,
        mut image: RasterImage,
        mode: AnalysisMode,
        use_metric: bool,
    ) -> ReportOutcome {
        let stats = self.redaction.redact(&mut image);
        info!(
            "🔒 Privacy pass: {} faces, {} plates redacted",
            stats.faces, stats.plates
        );

        let result = match mode {
            AnalysisMode::Offline => self.offline.estimate(&image, stats, use_metric),
            AnalysisMode::Online => self.online.estimate(&image, stats).await,
        };

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!("Estimation failed ({}): {}", mode, e);
                fold_error(e, mode)
            }
        };

        ReportOutcome {
            report,
            image,
            stats,
        }
    }
}

/// Convert an estimation error into the displayable report the caller
/// contract requires. The error's Display string carries the exact
/// prefix downstream consumers look for.
fn fold_error(error: EstimationError, mode: AnalysisMode) -> HazardReport {
    HazardReport::new(error.to_string(), mode)
}
