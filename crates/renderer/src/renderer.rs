//! The frame orchestrator.
//!
//! [`Renderer`] creates the Vulkan stack for a window and exposes the frame
//! protocol:
//!
//! ```no_run
//! # use vkframe_renderer::{Renderer, RendererResult};
//! # fn frame(renderer: &mut Renderer) -> RendererResult<()> {
//! if let Some(cmd) = renderer.begin_frame()? {
//!     renderer.begin_render(&cmd)?;
//!     // record draws into `cmd`
//!     renderer.end_render(&cmd)?;
//!     renderer.end_frame()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use vkframe_core::{Config, DescriptorConfig, PrecomputeConfig};
use vkframe_platform::{Surface, Window, wait_for_nonzero_extent};
use vkframe_resources::Cubemap;
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::descriptor::{DescriptorAllocator, DescriptorSetLayout, PoolCapacity};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::{Instance, InstanceDesc};
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::swapchain::{SurfaceConfig, Swapchain, SwapchainDesc};
use vkframe_rhi::vk;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::RendererResult;
use crate::frame::{FrameCycle, FramePhase};
use crate::frame_manager::FrameManager;
use crate::precompute::{EnvironmentMaps, prepare_environment};

/// Per-set capacity table from the `[descriptors]` config section.
pub fn pool_capacity(config: &DescriptorConfig) -> PoolCapacity {
    PoolCapacity {
        uniform_buffers: config.uniform_buffers,
        storage_buffers: config.storage_buffers,
        combined_image_samplers: config.combined_image_samplers,
        storage_images: config.storage_images,
    }
}

/// Owns the instance, device, swapchain and per-frame resources, and
/// drives one frame at a time.
///
/// GPU objects created through [`Renderer::device`] must be dropped before
/// the renderer.
pub struct Renderer {
    // Declaration order is teardown order.
    frames: FrameCycle<FrameManager>,
    descriptors: DescriptorAllocator,
    upload_pool: CommandPool,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl Renderer {
    pub fn new(window: &Window, config: &Config) -> RendererResult<Self> {
        info!("Initializing renderer");

        let surface_extensions = window.required_surface_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            app_name: c"vkframe",
            enable_validation: config.renderer.validation,
            surface_extensions: &surface_extensions,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let (width, height) = wait_for_nonzero_extent(window);
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            &SwapchainDesc {
                surface: surface.handle(),
                framebuffer_extent: vk::Extent2D { width, height },
                requested_samples: config.renderer.msaa_samples,
            },
        )?;

        let granted = swapchain.config().samples.as_raw();
        if granted < config.renderer.msaa_samples {
            warn!(
                "Requested {}x MSAA, device grants {}x",
                config.renderer.msaa_samples, granted
            );
        }

        let manager = FrameManager::new(
            device.clone(),
            swapchain,
            Box::new(window.clone()),
            MAX_FRAMES_IN_FLIGHT,
            config.renderer.clear_color,
        )?;

        let descriptors = DescriptorAllocator::new(
            device.clone(),
            pool_capacity(&config.descriptors),
            config.descriptors.initial_sets,
        )?;
        let upload_pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;

        info!("Renderer initialized");

        Ok(Self {
            frames: FrameCycle::new(manager, MAX_FRAMES_IN_FLIGHT),
            descriptors,
            upload_pool,
            device,
            surface,
            instance,
        })
    }

    /// Waits for the slot's previous work and acquires an image.
    ///
    /// `None` means the frame was skipped because the surface went out of
    /// date; the swapchain is already rebuilt.
    pub fn begin_frame(&mut self) -> RendererResult<Option<CommandBuffer>> {
        self.frames.begin_frame()
    }

    /// Transitions the targets and opens the render pass.
    pub fn begin_render(&mut self, cmd: &CommandBuffer) -> RendererResult<()> {
        self.frames.begin_render(cmd)
    }

    /// Closes the render pass and ends recording.
    pub fn end_render(&mut self, cmd: &CommandBuffer) -> RendererResult<()> {
        self.frames.end_render(cmd)
    }

    /// Submits and presents, then advances to the next frame slot.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        self.frames.end_frame()
    }

    /// Rebuilds the swapchain at the current window extent.
    ///
    /// Only valid between frames.
    pub fn recreate(&mut self) -> RendererResult<()> {
        if self.frames.phase() != FramePhase::Idle {
            return Err(crate::RendererError::OutOfOrder {
                operation: "recreate",
                phase: self.frames.phase(),
            });
        }
        self.frames.backend_mut().recreate_swapchain()?;
        Ok(())
    }

    /// Negotiated format, extent, sample count and depth format.
    #[inline]
    pub fn surface_config(&self) -> &SurfaceConfig {
        self.frames.backend().swapchain().config()
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Pool for one-shot uploads and the precompute.
    #[inline]
    pub fn upload_pool(&self) -> &CommandPool {
        &self.upload_pool
    }

    #[inline]
    pub fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    /// Allocates a binding set, growing the pool if it is exhausted.
    pub fn allocate_set(&mut self, layout: &DescriptorSetLayout) -> RendererResult<vk::DescriptorSet> {
        Ok(self.descriptors.allocate(layout)?)
    }

    /// Loads or computes the lighting artifacts for `source`.
    ///
    /// Must run outside a frame; it submits and waits on its own command
    /// buffers.
    pub fn precompute_environment(
        &mut self,
        config: &PrecomputeConfig,
        source: &Cubemap,
        shader_dir: &Path,
    ) -> RendererResult<EnvironmentMaps> {
        prepare_environment(
            &self.device,
            &self.upload_pool,
            &mut self.descriptors,
            config,
            source,
            shader_dir,
        )
    }

    #[inline]
    pub fn frame_slot(&self) -> usize {
        self.frames.slot()
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames.frames_submitted()
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer teardown: {}", e);
        }
        // Swapchain, pools and the device go first; the surface must
        // outlive the swapchain and die before the instance.
        let external = Arc::strong_count(&self.device) - 1;
        if external > 0 {
            warn!(
                "Renderer dropped while {} device reference(s) are still alive",
                external
            );
        }
        info!(
            "Renderer shutting down after {} frame(s)",
            self.frames.frames_submitted()
        );
    }
}
