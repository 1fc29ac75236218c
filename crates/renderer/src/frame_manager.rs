//! Vulkan side of the frame cycle.
//!
//! [`FrameManager`] owns one [`FrameData`] per frame slot (a command buffer
//! plus its [`SyncSet`]) and the swapchain, and implements
//! [`FrameBackend`] on top of them.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the slot's in-flight fence
//! 2. Acquire a swapchain image (signals the slot's image-acquired semaphore)
//! 3. Reset the fence, record into the slot's command buffer
//! 4. Submit:
//!    - wait on image-acquired at COLOR_ATTACHMENT_OUTPUT
//!    - signal render-complete
//!    - signal the in-flight fence
//! 5. Present, waiting on render-complete
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkframe_platform::{FramebufferSource, wait_for_nonzero_extent};
use vkframe_rhi::RhiResult;
use vkframe_rhi::barrier::{self, layout_barrier};
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::device::Device;
use vkframe_rhi::rendering::{ColorTarget, DepthTarget, RenderPassDesc, Resolve};
use vkframe_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use vkframe_rhi::sync::SyncSet;

use crate::error::RendererResult;
use crate::frame::FrameBackend;

/// Per-slot command buffer and synchronization.
pub struct FrameData {
    command_buffer: CommandBuffer,
    sync: SyncSet,
}

impl FrameData {
    fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let sync = SyncSet::new(device)?;
        Ok(Self {
            command_buffer,
            sync,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn sync(&self) -> &SyncSet {
        &self.sync
    }
}

/// Per-slot resources plus the swapchain they render into.
///
/// Not thread-safe; driven from the thread that owns the window.
pub struct FrameManager {
    // Field order is drop order: slot objects, their pool, then the
    // swapchain. The device outlives all of them.
    frames: Vec<FrameData>,
    command_pool: CommandPool,
    swapchain: Swapchain,
    window: Box<dyn FramebufferSource>,
    clear_color: [f32; 4],
    device: Arc<Device>,
}

impl FrameManager {
    /// Allocates `slot_count` command buffers and synchronization sets.
    pub fn new(
        device: Arc<Device>,
        swapchain: Swapchain,
        window: Box<dyn FramebufferSource>,
        slot_count: usize,
        clear_color: [f32; 4],
    ) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;

        let frames = (0..slot_count)
            .map(|slot| {
                let frame = FrameData::new(device.clone(), &command_pool)?;
                debug!("Created frame data for slot {}", slot);
                Ok(frame)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Frame manager created with {} frame(s) in flight", slot_count);

        Ok(Self {
            frames,
            command_pool,
            swapchain,
            window,
            clear_color,
            device,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn frame(&self, slot: usize) -> &FrameData {
        &self.frames[slot]
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Rebuilds the swapchain at the window's current, nonzero extent.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let (width, height) = wait_for_nonzero_extent(self.window.as_ref());
        self.swapchain.recreate(vk::Extent2D { width, height })
    }

    fn record_attachment_transitions(&self, cmd: &CommandBuffer, image: u32) -> RhiResult<()> {
        let targets = self.swapchain.targets()?;
        let color_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        let (color_masks, resolve_barrier) = layout_barrier(
            self.swapchain.image(image)?,
            color_range,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        let (_, msaa_barrier) = layout_barrier(
            targets.color().image().handle(),
            targets.color().image().full_range(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        cmd.pipeline_barrier(
            color_masks.src_stage,
            color_masks.dst_stage,
            &[resolve_barrier, msaa_barrier],
        );

        barrier::transition(
            cmd,
            targets.depth().image().handle(),
            targets.depth().image().full_range(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
    }
}

impl FrameBackend for FrameManager {
    type Command = CommandBuffer;

    fn wait_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.frames[slot].sync.in_flight().wait_forever()?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
        let signal = self.frames[slot].sync.image_acquired();
        Ok(self.swapchain.acquire(signal)?)
    }

    fn reset_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.frames[slot].sync.in_flight().reset()?;
        Ok(())
    }

    fn begin_commands(&mut self, slot: usize) -> RendererResult<CommandBuffer> {
        let cmd = &self.frames[slot].command_buffer;
        cmd.reset()?;
        cmd.begin()?;
        Ok(cmd.clone())
    }

    fn is_slot_command(&self, slot: usize, command: &CommandBuffer) -> bool {
        self.frames[slot].command_buffer.handle() == command.handle()
    }

    fn open_pass(&mut self, slot: usize, image: u32) -> RendererResult<()> {
        let cmd = &self.frames[slot].command_buffer;
        self.record_attachment_transitions(cmd, image)?;

        let targets = self.swapchain.targets()?;
        let extent = self.swapchain.extent();
        let pass = RenderPassDesc {
            extent,
            color: ColorTarget {
                view: targets.color().view(),
                clear: self.clear_color,
                resolve: Some(Resolve {
                    view: self.swapchain.image_view(image)?,
                }),
            },
            depth: Some(DepthTarget {
                view: targets.depth().view(),
                clear_depth: 1.0,
            }),
        }
        .build();

        cmd.begin_rendering(&pass.info());
        cmd.set_viewport_and_scissor(extent);
        Ok(())
    }

    fn close_pass(&mut self, slot: usize, image: u32) -> RendererResult<()> {
        let cmd = &self.frames[slot].command_buffer;
        cmd.end_rendering();
        barrier::transition(
            cmd,
            self.swapchain.image(image)?,
            vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        cmd.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RendererResult<()> {
        let frame = &self.frames[slot];
        let wait_semaphores = [frame.sync.image_acquired()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync.render_complete()];
        let command_buffers = [frame.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.sync.in_flight().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> RendererResult<PresentOutcome> {
        let wait = self.frames[slot].sync.render_complete();
        Ok(self.swapchain.present(image, wait)?)
    }

    fn take_resize_pending(&mut self) -> bool {
        self.window.take_resize_pending()
    }

    fn recreate(&mut self) -> RendererResult<()> {
        self.recreate_swapchain()?;
        Ok(())
    }
}
