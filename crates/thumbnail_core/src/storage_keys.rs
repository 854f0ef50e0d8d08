use percent_encoding::percent_decode_str;

use crate::contract::ValidationError;

pub const DEFAULT_INBOX_PREFIX: &str = "original/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEligibility {
    Eligible,
    OutsideInbox,
    FolderPlaceholder,
}

impl KeyEligibility {
    pub fn skip_reason(self) -> Option<&'static str> {
        match self {
            Self::Eligible => None,
            Self::OutsideInbox => Some("outside_inbox_prefix"),
            Self::FolderPlaceholder => Some("folder_placeholder"),
        }
    }
}

/// Decodes an object key as delivered in storage notifications: form encoded,
/// so `+` stands for a space and `%XX` escapes must form valid UTF-8.
pub fn decode_object_key(encoded: &str) -> Result<String, ValidationError> {
    let spaced = encoded.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|error| {
            ValidationError::new(format!(
                "object key '{encoded}' is not valid percent-encoded UTF-8: {error}"
            ))
        })
}

pub fn normalize_inbox_prefix(prefix: &str) -> Result<String, ValidationError> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(ValidationError::new("inbox prefix cannot be empty"));
    }
    Ok(format!("{trimmed}/"))
}

pub fn classify_key(key: &str, inbox_prefix: &str) -> KeyEligibility {
    if !key.starts_with(inbox_prefix) {
        return KeyEligibility::OutsideInbox;
    }
    if matches!(object_basename(key), "" | "." | "..") {
        return KeyEligibility::FolderPlaceholder;
    }
    KeyEligibility::Eligible
}

pub fn object_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

pub fn derived_variant_key(profile_name: &str, source_key: &str) -> String {
    format!("{profile_name}/{}", object_basename(source_key))
}
