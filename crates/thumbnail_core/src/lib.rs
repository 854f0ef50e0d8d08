//! Shared thumbnail pipeline domain primitives.
//!
//! This crate owns deterministic behavior: target geometry, size profiles,
//! derived storage keys, the notification/response contract, and variant
//! rendering. It intentionally excludes AWS SDK and Lambda runtime concerns,
//! which live in `thumbnail_lambda`.

pub mod contract;
pub mod geometry;
pub mod profiles;
pub mod render;
pub mod storage_keys;
