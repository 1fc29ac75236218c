//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Owns every raw Vulkan object the renderer touches and ties its lifetime
//! to a Rust value:
//! - Instance, physical-device selection and the logical device
//! - Swapchain with its MSAA color and depth attachments
//! - Growable descriptor allocation
//! - Command recording, images, buffers, samplers and pipelines
//! - Synchronization primitives and the layout-transition barrier table

mod error;

pub mod attachments;
pub mod barrier;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{ErrorKind, RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
