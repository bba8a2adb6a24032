// src/segmentation.rs
//
// Fixed-size semantic segmentation over 21 classes. The model is loaded
// once and shared for the process lifetime; inference calls are
// serialized by the &mut receiver.

use crate::detection::resize_bilinear;
use crate::types::RasterImage;
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use tracing::{debug, info};

pub const MODEL_SIZE: usize = 257;
pub const NUM_CLASSES: usize = 21;

pub struct SegmentationModel {
    session: Session,
}

impl SegmentationModel {
    pub fn load(model_path: &str, num_threads: usize) -> Result<Self> {
        info!("Loading segmentation model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)
            .context("Failed to load segmentation model")?;

        info!("✓ Segmentation model initialized");
        Ok(Self { session })
    }

    /// Resize to 257x257, normalize, run the network. Output is a flat
    /// score tensor with stride `pixel * 21 + class`.
    pub fn run(&mut self, image: &RasterImage) -> Result<Vec<f32>> {
        let input = preprocess(image);

        let shape = [1, MODEL_SIZE, MODEL_SIZE, 3];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["image" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;

        debug!("Segmentation output: {} scores", data.len());
        Ok(data.to_vec())
    }
}

/// Bilinear resize to the model square, cast to f32, normalize each
/// channel with (v - 127.5) / 127.5. HWC layout, matching the network.
pub(crate) fn preprocess(image: &RasterImage) -> Vec<f32> {
    let resized = resize_bilinear(
        &image.data,
        image.width,
        image.height,
        MODEL_SIZE,
        MODEL_SIZE,
    );
    resized
        .iter()
        .map(|&v| (v as f32 - 127.5) / 127.5)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let mut img = RasterImage::new(100, 80);
        img.data.fill(255);

        let input = preprocess(&img);
        assert_eq!(input.len(), MODEL_SIZE * MODEL_SIZE * 3);
        // 255 -> (255 - 127.5) / 127.5 = 1.0
        assert!((input[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_midpoint_maps_to_zero() {
        let mut img = RasterImage::new(10, 10);
        for b in img.data.iter_mut() {
            *b = 128;
        }
        let input = preprocess(&img);
        // 128 -> (128 - 127.5) / 127.5 ≈ 0.0039
        assert!(input[0].abs() < 0.01);
    }
}
