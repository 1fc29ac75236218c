//! Platform layer: window, Vulkan surface and input.
//!
//! - [`Window`]: winit window plus the resize-pending flag
//! - [`FramebufferSource`] and [`wait_for_nonzero_extent`]: what the frame
//!   loop needs from a window when recreating the swapchain
//! - [`InputContext`]: keyboard and mouse state owned by the shell

mod extent;
mod input;
mod window;

pub use extent::{FramebufferSource, wait_for_nonzero_extent};
pub use input::{InputContext, KeyCode, MouseButton};
pub use window::{Surface, Window, required_surface_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
