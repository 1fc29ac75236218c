//! The window side of swapchain recreation.

/// Where the frame loop learns the framebuffer size and whether the
/// window asked for a resize.
pub trait FramebufferSource {
    /// Current framebuffer size in pixels. Zero while minimized.
    fn framebuffer_extent(&self) -> (u32, u32);

    /// Returns the resize flag and clears it.
    fn take_resize_pending(&self) -> bool;

    /// Blocks briefly so the window state can change.
    fn wait_for_change(&self);
}

/// Blocks until the framebuffer has nonzero area and returns that size.
///
/// Swapchains are never created for a minimized window; recreation calls
/// this first.
pub fn wait_for_nonzero_extent<S: FramebufferSource + ?Sized>(source: &S) -> (u32, u32) {
    let mut logged = false;
    loop {
        let (width, height) = source.framebuffer_extent();
        if width > 0 && height > 0 {
            if logged {
                tracing::info!("Framebuffer restored to {}x{}", width, height);
            }
            return (width, height);
        }
        if !logged {
            tracing::debug!("Framebuffer has zero area, waiting");
            logged = true;
        }
        source.wait_for_change();
    }
}
