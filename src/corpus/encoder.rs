//! Resize-and-encode capability used by the example generator

use super::ImageFormat;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// JPEG quality used when none is requested
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Lossy WebP quality used when none is requested
pub const DEFAULT_WEBP_QUALITY: u8 = 80;

/// Encoding errors
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("WebP encoding failed: {0}")]
    Webp(String),

    #[error("Source image has no pixels")]
    EmptySource,
}

/// Resize a source image to a target width and write it in a given format
#[async_trait]
pub trait VariantEncoder: Send + Sync {
    /// Encode `source` at `width` into `output`, returning the resulting height
    async fn encode(
        &self,
        source: &Path,
        width: u32,
        format: ImageFormat,
        quality: Option<u8>,
        output: &Path,
    ) -> Result<u32, EncodeError>;
}

/// [`VariantEncoder`] backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateEncoder;

#[async_trait]
impl VariantEncoder for ImageCrateEncoder {
    #[tracing::instrument(
        name = "corpus.encode",
        skip_all,
        fields(source = %source.display(), width = width, format = %format),
        err
    )]
    async fn encode(
        &self,
        source: &Path,
        width: u32,
        format: ImageFormat,
        quality: Option<u8>,
        output: &Path,
    ) -> Result<u32, EncodeError> {
        let source = source.to_path_buf();
        let output: PathBuf = output.to_path_buf();

        tokio::task::spawn_blocking(move || encode_blocking(&source, width, format, quality, &output))
            .await?
    }
}

/// Height that keeps the source aspect ratio at `width`
pub fn scaled_height(src_width: u32, src_height: u32, width: u32) -> u32 {
    let height = (u64::from(src_height) * u64::from(width) + u64::from(src_width) / 2)
        / u64::from(src_width.max(1));
    u32::try_from(height).unwrap_or(u32::MAX).max(1)
}

/// PNG is lossless, so quality selects the compression effort
fn png_compression(quality: Option<u8>) -> CompressionType {
    match quality {
        Some(q) if q >= 80 => CompressionType::Best,
        Some(q) if q < 40 => CompressionType::Fast,
        _ => CompressionType::Default,
    }
}

fn encode_blocking(
    source: &Path,
    width: u32,
    format: ImageFormat,
    quality: Option<u8>,
    output: &Path,
) -> Result<u32, EncodeError> {
    // Sources are arbitrary files, so sniff the format from the content.
    let img = ImageReader::open(source)?.with_guessed_format()?.decode()?;
    if img.width() == 0 || img.height() == 0 {
        return Err(EncodeError::EmptySource);
    }

    let height = scaled_height(img.width(), img.height(), width);
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);

    let mut writer = BufWriter::new(File::create(output)?);
    match format {
        ImageFormat::Webp => {
            let quality = quality.unwrap_or(DEFAULT_WEBP_QUALITY);
            let rgba = resized.to_rgba8();
            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                .encode_simple(false, f32::from(quality))
                .map_err(|e| EncodeError::Webp(format!("{e:?}")))?;
            writer.write_all(&encoded)?;
        }
        ImageFormat::Png => {
            resized.write_with_encoder(PngEncoder::new_with_quality(
                &mut writer,
                png_compression(quality),
                PngFilter::Adaptive,
            ))?;
        }
        ImageFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY);
            DynamicImage::ImageRgb8(resized.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))?;
        }
    }
    writer.flush()?;

    Ok(height)
}
