//! # Paperflow Common Library
//!
//! Shared code for the Paperflow document ingest service:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Event types and EventBus
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
