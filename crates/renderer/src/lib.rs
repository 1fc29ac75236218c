//! Frame orchestration and lighting precompute.
//!
//! - [`Renderer`]: owns the Vulkan stack for one window and drives the
//!   `begin_frame` / `begin_render` / `end_render` / `end_frame` protocol
//! - [`frame`]: the device-independent frame-cycle state machine
//! - [`precompute`]: irradiance, prefiltered and BRDF artifacts with their
//!   on-disk cache
//! - [`texture`]: uploads KTX images as sampled textures

mod error;

pub mod frame;
pub mod frame_manager;
pub mod precompute;
pub mod renderer;
pub mod texture;

pub use error::{RendererError, RendererResult};
pub use frame::{FrameBackend, FrameCycle, FramePhase};
pub use precompute::EnvironmentMaps;
pub use renderer::Renderer;
pub use texture::Texture;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Where compiled SPIR-V is loaded from, relative to the working directory.
pub const SHADER_DIR: &str = "shaders/spirv";
