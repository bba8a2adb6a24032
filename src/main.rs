// src/main.rs

mod codec;
mod config;
mod detection;
mod error;
mod export;
mod offline_estimator;
mod online_estimator;
mod pipeline;
mod redaction;
mod segmentation;
mod types;

use anyhow::{Context, Result};
use detection::{
    FaceDetector, ObjectDetector, OnnxFaceDetector, OnnxObjectDetector, OnnxTextRecognizer,
    TextRecognizer,
};
use export::{csv_content, CompletedReport};
use offline_estimator::OfflineHazardEstimator;
use online_estimator::OnlineHazardEstimator;
use pipeline::ReportPipeline;
use redaction::RedactionEngine;
use segmentation::SegmentationModel;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use types::{AnalysisMode, Config};
use walkdir::WalkDir;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "walksafe_pipeline={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚶 WalkSafe Hazard Reporting Pipeline Starting");
    info!("✓ Configuration loaded");

    let mode = if config.report.default_online {
        AnalysisMode::Online
    } else {
        AnalysisMode::Offline
    };
    info!(
        "Analysis mode: {} | units: {}",
        mode,
        if config.report.use_metric {
            "metric"
        } else {
            "imperial"
        }
    );

    let mut pipeline = build_pipeline(&config)?;

    let image_files = find_image_files(&config.report.input_dir)?;
    if image_files.is_empty() {
        error!("No image files found in {}", config.report.input_dir);
        return Ok(());
    }
    info!("Found {} image(s) to process", image_files.len());

    std::fs::create_dir_all(&config.report.output_dir)
        .with_context(|| format!("Failed to create {}", config.report.output_dir))?;

    let mut completed: Vec<CompletedReport> = Vec::new();
    let mut failures = 0usize;

    for (idx, path) in image_files.iter().enumerate() {
        info!(
            "Processing image {}/{}: {}",
            idx + 1,
            image_files.len(),
            path.display()
        );

        match process_image(&mut pipeline, path, &config, mode).await {
            Ok(report) => completed.push(report),
            Err(e) => {
                failures += 1;
                error!("✗ {}: {}", path.display(), e);
            }
        }
    }

    if !completed.is_empty() {
        let csv_path = Path::new(&config.report.output_dir).join("reports.csv");
        std::fs::write(&csv_path, csv_content(&completed))
            .with_context(|| format!("Failed to write {}", csv_path.display()))?;
        info!("📄 CSV export written: {}", csv_path.display());
    }

    info!("\n========================================");
    info!("✓ Run complete");
    info!("  Reports generated: {}", completed.len());
    info!("  Failures: {}", failures);
    info!(
        "  Faces redacted: {}",
        completed.iter().map(|r| r.stats.faces).sum::<u32>()
    );
    info!(
        "  Plates redacted: {}",
        completed.iter().map(|r| r.stats.plates).sum::<u32>()
    );
    info!("========================================");

    Ok(())
}

/// Build the pipeline from config. Every model is optional at runtime:
/// a detector that fails to load degrades its redaction category, a
/// missing segmentation model turns offline estimation into an
/// explanatory report. Only the HTTP client is mandatory.
fn build_pipeline(config: &Config) -> Result<ReportPipeline> {
    let threads = config.models.num_threads;

    let faces: Option<Box<dyn FaceDetector>> = match OnnxFaceDetector::new(
        &config.models.face_model,
        config.redaction.face_confidence_threshold,
        threads,
    ) {
        Ok(d) => Some(Box::new(d)),
        Err(e) => {
            warn!("Face detector unavailable: {}", e);
            None
        }
    };

    let objects: Option<Box<dyn ObjectDetector>> = match OnnxObjectDetector::new(
        &config.models.object_model,
        config.redaction.object_confidence_threshold,
        threads,
    ) {
        Ok(d) => Some(Box::new(d)),
        Err(e) => {
            warn!("Object detector unavailable: {}", e);
            None
        }
    };

    let text: Option<Box<dyn TextRecognizer>> = match OnnxTextRecognizer::new(
        &config.models.text_detection_model,
        &config.models.text_recognition_model,
        config.redaction.text_box_threshold,
        threads,
    ) {
        Ok(d) => Some(Box::new(d)),
        Err(e) => {
            warn!("Text recognizer unavailable: {}", e);
            None
        }
    };

    let segmentation = match SegmentationModel::load(&config.models.segmentation_model, threads) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Segmentation model unavailable: {}", e);
            None
        }
    };

    let redaction = RedactionEngine::new(faces, objects, text);
    let offline = OfflineHazardEstimator::new(segmentation);
    let online = OnlineHazardEstimator::new(config.online.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

    Ok(ReportPipeline::new(redaction, offline, online))
}

async fn process_image(
    pipeline: &mut ReportPipeline,
    path: &Path,
    config: &Config,
    mode: AnalysisMode,
) -> Result<CompletedReport> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let image = codec::decode(&bytes)?;

    let outcome = pipeline
        .process(image, mode, config.report.use_metric)
        .await;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    let out_dir = Path::new(&config.report.output_dir);

    let redacted_path = out_dir.join(format!("{}_redacted.jpg", stem));
    std::fs::write(&redacted_path, codec::encode_jpeg(&outcome.image, 100)?)
        .with_context(|| format!("Failed to write {}", redacted_path.display()))?;

    let report_path = out_dir.join(format!("{}_report.txt", stem));
    std::fs::write(&report_path, &outcome.report.text)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;

    info!(
        "✓ {} -> {} ({} faces, {} plates)",
        path.display(),
        report_path.display(),
        outcome.stats.faces,
        outcome.stats.plates
    );

    Ok(CompletedReport::new(
        config.report.latitude,
        config.report.longitude,
        outcome.report.text,
        outcome.stats,
    ))
}

fn find_image_files(input_dir: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png")
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}
