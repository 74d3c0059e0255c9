//! Error type shared by the Paperflow crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Config and filesystem failures outside the engine's own error enums
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML config could not be read, parsed or serialized
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
