//! Error types for resource loading.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A KTX file failed validation.
    #[error("Invalid KTX data: {0}")]
    InvalidKtx(String),

    /// The KTX file is valid but uses a format this crate does not handle.
    #[error("Unsupported KTX format: glInternalFormat {internal_format:#06x}, glType {gl_type:#06x}")]
    UnsupportedKtxFormat { internal_format: u32, gl_type: u32 },

    /// Cubemap faces are missing, not square, or of different sizes.
    #[error("Invalid cubemap '{path}': {reason}")]
    InvalidCubemap {
        /// File or directory the cubemap was loaded from.
        path: PathBuf,
        reason: String,
    },

    /// Pixel data does not match the declared dimensions.
    #[error("Pixel data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
