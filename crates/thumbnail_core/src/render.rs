//! Variant rendering.
//!
//! A source is decoded once and normalized to 8-bit RGB, then every size
//! profile is resampled with Lanczos3 and encoded as JPEG. Profiles render on
//! the rayon pool; the decoded source is shared read-only between them.

use image::codecs::jpeg::JpegEncoder;
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::imageops::FilterType;
use image::{ColorType, RgbImage};
use rayon::prelude::*;
use thiserror::Error;

use crate::contract::ErrorKind;
use crate::geometry::compute_target_size;
use crate::profiles::SizeProfile;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";
/// JPEG frame headers store each dimension in 16 bits.
pub const MAX_JPEG_DIMENSION: u32 = u16::MAX as u32;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode variant: {0}")]
    Encode(#[source] image::ImageError),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::Encode(_) => ErrorKind::EncodeError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbImage,
    original_color: ColorType,
}

impl SourceImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, RenderError> {
        let decoded = image::load_from_memory(bytes).map_err(RenderError::Decode)?;
        let original_color = decoded.color();
        Ok(Self {
            pixels: decoded.to_rgb8(),
            original_color,
        })
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            original_color: ColorType::Rgb8,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn original_color(&self) -> ColorType {
        self.original_color
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVariant {
    pub profile_name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

pub fn render_variant(
    source: &SourceImage,
    target_width: u32,
    target_height: u32,
    quality: u8,
) -> Result<Vec<u8>, RenderError> {
    if target_width > MAX_JPEG_DIMENSION || target_height > MAX_JPEG_DIMENSION {
        return Err(RenderError::Encode(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::Generic(format!(
                "{target_width}x{target_height} exceeds the JPEG limit of {MAX_JPEG_DIMENSION} pixels per side"
            )),
        ))));
    }

    let resized;
    let pixels = if target_width == source.width() && target_height == source.height() {
        &source.pixels
    } else {
        resized = image::imageops::resize(
            &source.pixels,
            target_width,
            target_height,
            FilterType::Lanczos3,
        );
        &resized
    };

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode(pixels.as_raw(), target_width, target_height, ColorType::Rgb8)
        .map_err(RenderError::Encode)?;

    Ok(buffer)
}

/// Renders every profile for one source. Results keep the order of `profiles`.
pub fn render_profiles<'a>(
    source: &SourceImage,
    profiles: &'a [SizeProfile],
    quality: u8,
) -> Vec<(&'a SizeProfile, Result<RenderedVariant, RenderError>)> {
    profiles
        .par_iter()
        .map(|profile| {
            let (width, height) =
                compute_target_size(source.width(), source.height(), profile.max_width);
            let rendered =
                render_variant(source, width, height, quality).map(|bytes| RenderedVariant {
                    profile_name: profile.name.clone(),
                    width,
                    height,
                    bytes,
                });
            (profile, rendered)
        })
        .collect()
}
