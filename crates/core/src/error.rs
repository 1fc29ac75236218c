//! Error type shared by the non-GPU layers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by configuration, windowing and file handling.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or handle retrieval failed.
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan surface creation failed.
    #[error("Surface error: {0}")]
    Surface(String),

    /// A config file could not be parsed.
    #[error("Failed to parse config '{path}': {message}")]
    ConfigParse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A config value is out of range.
    #[error("Invalid config value for `{field}`: {reason}")]
    ConfigValue {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Config could not be serialized.
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
