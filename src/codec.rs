// src/codec.rs
//
// Decode captured images into the pipeline's mutable raster and re-encode
// to JPEG for network transfer / storage.

use crate::types::RasterImage;
use anyhow::{Context, Result};
use image::{ImageBuffer, RgbImage};

/// Decode an encoded image (JPEG/PNG/...) into an RGB raster.
pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
    let img = image::load_from_memory(bytes)
        .context("Failed to decode image")?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(RasterImage {
        data: img.into_raw(),
        width: width as usize,
        height: height as usize,
    })
}

/// Encode the raster as JPEG at the given quality (1-100).
pub fn encode_jpeg(image: &RasterImage, quality: u8) -> Result<Vec<u8>> {
    let img: RgbImage = ImageBuffer::from_raw(
        image.width as u32,
        image.height as u32,
        image.data.clone(),
    )
    .context("Raster buffer does not match its dimensions")?;

    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;

    Ok(buf.into_inner())
}
