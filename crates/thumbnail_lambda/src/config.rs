use std::time::Duration;

use thiserror::Error;
use thumbnail_core::profiles::{parse_size_profiles, SizeProfile, DEFAULT_SIZE_PROFILES};
use thumbnail_core::render::DEFAULT_JPEG_QUALITY;
use thumbnail_core::storage_keys::{normalize_inbox_prefix, DEFAULT_INBOX_PREFIX};

pub const INBOX_PREFIX_VAR: &str = "THUMBNAIL_INBOX_PREFIX";
pub const SIZE_PROFILES_VAR: &str = "THUMBNAIL_SIZE_PROFILES";
pub const JPEG_QUALITY_VAR: &str = "THUMBNAIL_JPEG_QUALITY";
pub const OUTPUT_BUCKET_VAR: &str = "THUMBNAIL_OUTPUT_BUCKET";
pub const MIN_REMAINING_MS_VAR: &str = "THUMBNAIL_MIN_REMAINING_MS";

pub const DEFAULT_MIN_REMAINING: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{variable} is misconfigured: {message}")]
pub struct ConfigError {
    pub variable: &'static str,
    pub message: String,
}

impl ConfigError {
    fn new(variable: &'static str, message: impl Into<String>) -> Self {
        Self {
            variable,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub inbox_prefix: String,
    pub profiles: Vec<SizeProfile>,
    pub jpeg_quality: u8,
    pub output_container: Option<String>,
    pub min_remaining: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
            profiles: thumbnail_core::profiles::default_size_profiles(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            output_container: None,
            min_remaining: DEFAULT_MIN_REMAINING,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let inbox_prefix = normalize_inbox_prefix(
            &read(INBOX_PREFIX_VAR).unwrap_or_else(|| DEFAULT_INBOX_PREFIX.to_string()),
        )
        .map_err(|error| ConfigError::new(INBOX_PREFIX_VAR, error.message()))?;

        let profiles = parse_size_profiles(
            &read(SIZE_PROFILES_VAR).unwrap_or_else(|| DEFAULT_SIZE_PROFILES.to_string()),
        )
        .map_err(|error| ConfigError::new(SIZE_PROFILES_VAR, error.message()))?;

        let jpeg_quality = match read(JPEG_QUALITY_VAR) {
            Some(value) => parse_quality(&value)?,
            None => DEFAULT_JPEG_QUALITY,
        };

        let min_remaining = match read(MIN_REMAINING_MS_VAR) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|error| ConfigError::new(MIN_REMAINING_MS_VAR, error.to_string()))?,
            None => DEFAULT_MIN_REMAINING,
        };

        let output_container = read(OUTPUT_BUCKET_VAR).map(|value| value.trim().to_string());

        let config = Self {
            inbox_prefix,
            profiles,
            jpeg_quality,
            output_container,
            min_remaining,
        };
        config.validate()?;
        Ok(config)
    }

    /// Derived variants must never land back under the inbox prefix, or every
    /// write would trigger another round of processing. Variant keys are
    /// `{profile}/{basename}` with a slash-free basename, so only an inbox
    /// prefix equal to `{profile}/` can capture them.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.output_container.is_some() {
            return Ok(());
        }

        for profile in &self.profiles {
            let derived_prefix = format!("{}/", profile.name);
            if self.inbox_prefix == derived_prefix {
                return Err(ConfigError::new(
                    SIZE_PROFILES_VAR,
                    format!(
                        "profile '{}' would write variants under inbox prefix '{}'",
                        profile.name, self.inbox_prefix
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn parse_quality(value: &str) -> Result<u8, ConfigError> {
    let quality = value
        .trim()
        .parse::<u8>()
        .map_err(|error| ConfigError::new(JPEG_QUALITY_VAR, error.to_string()))?;
    if !(1..=100).contains(&quality) {
        return Err(ConfigError::new(
            JPEG_QUALITY_VAR,
            format!("quality must be between 1 and 100, got {quality}"),
        ));
    }
    Ok(quality)
}
