use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::contract::ValidationError;

pub const DEFAULT_SIZE_PROFILES: &str = "small=300,medium=800";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SizeProfile {
    pub name: String,
    pub max_width: u32,
}

impl SizeProfile {
    pub fn new(name: impl Into<String>, max_width: u32) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::new("size profile names must be non-empty"));
        }
        if name.contains('/') {
            return Err(ValidationError::new(format!(
                "size profile '{name}' must not contain '/'"
            )));
        }
        if max_width == 0 {
            return Err(ValidationError::new(format!(
                "size profile '{name}' must have a positive max width"
            )));
        }

        Ok(Self { name, max_width })
    }
}

pub fn default_size_profiles() -> Vec<SizeProfile> {
    vec![
        SizeProfile {
            name: "small".to_string(),
            max_width: 300,
        },
        SizeProfile {
            name: "medium".to_string(),
            max_width: 800,
        },
    ]
}

/// Parses a comma-separated list of `name=max_width` entries, keeping the
/// declared order.
pub fn parse_size_profiles(list: &str) -> Result<Vec<SizeProfile>, ValidationError> {
    let mut profiles = Vec::new();
    let mut seen = BTreeSet::new();

    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let Some((name, width)) = entry.split_once('=') else {
            return Err(ValidationError::new(format!(
                "size profile '{entry}' must look like name=max_width"
            )));
        };
        let max_width = width.trim().parse::<u32>().map_err(|error| {
            ValidationError::new(format!(
                "size profile '{entry}' has an invalid max width: {error}"
            ))
        })?;

        let profile = SizeProfile::new(name, max_width)?;
        if !seen.insert(profile.name.clone()) {
            return Err(ValidationError::new(format!(
                "size profile '{}' is declared more than once",
                profile.name
            )));
        }
        profiles.push(profile);
    }

    if profiles.is_empty() {
        return Err(ValidationError::new("at least one size profile is required"));
    }

    Ok(profiles)
}
