//! Window management using winit.
//!
//! [`Window`] is a cheap clone over the winit window plus a shared
//! resize-pending flag, so the application shell and the frame loop can
//! each hold one.

use std::ffi::CStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkframe_core::{Error, Result, WindowConfig};

use crate::extent::FramebufferSource;

/// How long [`Window::wait_for_change`] sleeps between size queries.
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);

/// RAII wrapper for a Vulkan surface.
///
/// The caller must ensure that the Vulkan instance outlives this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window::create_surface from the same instance
        // as the loader, and destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Shared handle to the application window.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
    resize_pending: Arc<AtomicBool>,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", config.width, config.height);

        Ok(Self {
            window: Arc::new(window),
            resize_pending: Arc::new(AtomicBool::new(false)),
        })
    }

    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Records that the framebuffer changed size. Called from the
    /// `Resized` event; the frame loop consumes it after presenting.
    pub fn mark_resized(&self) {
        self.resize_pending.store(true, Ordering::Release);
    }

    /// Width over height, or 1.0 while minimized.
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.framebuffer_extent();
        if height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_surface_extensions(&self) -> Result<Vec<&'static CStr>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {e}")))?;
        required_surface_extensions(display_handle.as_raw())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// `instance` must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {e}")))?;

        // SAFETY: entry and instance are valid for the duration of the call and
        // the handles come from a live winit window. Destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Surface(format!("Failed to create Vulkan surface: {e}")))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

impl FramebufferSource for Window {
    fn framebuffer_extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn take_resize_pending(&self) -> bool {
        self.resize_pending.swap(false, Ordering::AcqRel)
    }

    fn wait_for_change(&self) {
        std::thread::sleep(MINIMIZED_POLL_INTERVAL);
    }
}

/// Instance extensions required to create a surface on `display_handle`.
pub fn required_surface_extensions(
    display_handle: raw_window_handle::RawDisplayHandle,
) -> Result<Vec<&'static CStr>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Surface(format!("Failed to enumerate surface extensions: {e}")))?;

    // SAFETY: ash_window returns pointers to static, null-terminated extension
    // name constants.
    let names: Vec<&'static CStr> = extensions
        .iter()
        .map(|&ext| unsafe { CStr::from_ptr(ext) })
        .collect();

    tracing::debug!("Required surface extensions: {:?}", names);
    Ok(names)
}
