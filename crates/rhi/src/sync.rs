//! Synchronization primitives.
//!
//! - [`Semaphore`]: GPU-to-GPU ordering between queue operations
//! - [`Fence`]: GPU-to-CPU completion signal the host can wait on
//! - [`SyncSet`]: the pair of semaphores plus one fence owned by a frame slot
//!
//! A [`SyncSet`] starts as: acquire semaphore unsignaled, render-complete
//! semaphore unsignaled, fence **signaled**. The first wait on a fresh slot
//! therefore returns immediately.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-waitable fence.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout_ns` elapses.
    ///
    /// A timeout surfaces as `VulkanError(TIMEOUT)`.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)?
        };
        Ok(())
    }

    /// Blocks until the GPU signals the fence, however long that takes.
    pub fn wait_forever(&self) -> RhiResult<()> {
        self.wait(u64::MAX)
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// Must only be called after a successful wait and before the next
    /// submission that signals it.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> RhiResult<bool> {
        Ok(unsafe { self.device.handle().get_fence_status(self.fence)? })
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Per-frame-slot synchronization set.
///
/// Creation failure is fatal to the caller; nothing here retries.
pub struct SyncSet {
    image_acquired: Semaphore,
    render_complete: Semaphore,
    in_flight: Fence,
}

impl SyncSet {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_acquired = Semaphore::new(device.clone())?;
        let render_complete = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        debug!("Created synchronization set");

        Ok(Self {
            image_acquired,
            render_complete,
            in_flight,
        })
    }

    /// Signaled by the presentation engine when the acquired image is ready.
    #[inline]
    pub fn image_acquired(&self) -> vk::Semaphore {
        self.image_acquired.handle()
    }

    /// Signaled by the graphics queue when the slot's commands finish.
    #[inline]
    pub fn render_complete(&self) -> vk::Semaphore {
        self.render_complete.handle()
    }

    /// Signaled on completion of the slot's submission.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}
