//! AWS-oriented adapters and handlers for the thumbnail pipeline.
//!
//! This crate owns runtime integration details (Lambda handler, storage
//! gateways, configuration and logging) on top of the pure primitives in
//! `thumbnail_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
