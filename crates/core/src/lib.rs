//! Shared foundations for the vkframe crates.
//!
//! - [`Error`] and [`Result`] for configuration, window and I/O failures
//! - [`init_logging`] to install the tracing subscriber
//! - [`FrameTimer`] for per-frame delta time
//! - [`Config`] loaded from TOML

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CameraConfig, Config, DescriptorConfig, PositionerKind, PrecomputeConfig, RendererConfig,
    WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
