use std::borrow::Cow;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, Rgba, RgbaImage};
use sha2::{Digest, Sha256};

pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_width: 512,
            max_height: 512,
            quality: 85,
        }
    }
}

/// JPEG payload ready to send to the vision model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// Opens an uploaded photo. Only the upload formats the UI offers are taken.
pub fn load_upload(path: &Path) -> Result<DynamicImage> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        bail!(
            "unsupported image type for {} (expected {})",
            path.display(),
            ACCEPTED_EXTENSIONS.join(", ")
        );
    }
    image::open(path).with_context(|| format!("failed to decode {}", path.display()))
}

/// Shrinks `image` to fit the bound, keeping its aspect ratio, and encodes it
/// as JPEG. Images already inside the bound keep their size.
pub fn preprocess_image(image: &DynamicImage, options: &PreprocessOptions) -> Result<PreparedImage> {
    let fits = image.width() <= options.max_width && image.height() <= options.max_height;
    let bounded = if fits {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize(options.max_width, options.max_height, FilterType::Triangle))
    };
    let rgb = flatten_onto_white(&bounded);

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, options.quality.clamp(1, 100));
    encoder.encode_image(&rgb).context("JPEG encode failed")?;
    Ok(PreparedImage {
        bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Composites transparent pixels over a white canvas.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let mut canvas = RgbaImage::from_pixel(image.width(), image.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}
