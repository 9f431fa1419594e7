//! Shared types for the camara ingestion workspace
//!
//! Provides the common error type, progress event bus, data-directory
//! configuration, per-year database initialization, and the legislative
//! term banding table used by every stage of the pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod term;

pub use error::{Error, Result};
