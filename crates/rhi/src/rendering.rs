//! Dynamic rendering descriptions (Vulkan 1.3).
//!
//! A render pass is described with plain structs, then turned into a
//! [`RenderingInfoBundle`] that owns the attachment infos the
//! `VkRenderingInfo` points at.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::vk;
//! use vkframe_rhi::rendering::{ColorTarget, DepthTarget, RenderPassDesc, Resolve};
//! use vkframe_rhi::command::CommandBuffer;
//!
//! # fn example(msaa: vk::ImageView, swap: vk::ImageView, depth: vk::ImageView, cmd: &CommandBuffer) {
//! let desc = RenderPassDesc {
//!     extent: vk::Extent2D { width: 800, height: 600 },
//!     color: ColorTarget {
//!         view: msaa,
//!         clear: [0.1, 0.1, 0.15, 1.0],
//!         resolve: Some(Resolve { view: swap }),
//!     },
//!     depth: Some(DepthTarget { view: depth, clear_depth: 1.0 }),
//! };
//! let bundle = desc.build();
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Single-sample image a multisample color target resolves into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolve {
    pub view: vk::ImageView,
}

/// Color attachment, always cleared at the start of the pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorTarget {
    pub view: vk::ImageView,
    pub clear: [f32; 4],
    /// When set, samples are averaged into the resolve view and the
    /// multisample contents are discarded.
    pub resolve: Option<Resolve>,
}

impl ColorTarget {
    pub fn attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let info = vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear,
                },
            });

        match self.resolve {
            Some(resolve) => info
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(resolve.view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            None => info.store_op(vk::AttachmentStoreOp::STORE),
        }
    }
}

/// Depth attachment, cleared and discarded after the pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthTarget {
    pub view: vk::ImageView,
    /// 1.0 is the far plane.
    pub clear_depth: f32,
}

impl DepthTarget {
    pub fn attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// One dynamic-rendering pass over the full `extent`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPassDesc {
    pub extent: vk::Extent2D,
    pub color: ColorTarget,
    pub depth: Option<DepthTarget>,
}

impl RenderPassDesc {
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: [self.color.attachment_info()],
            depth_attachment: self.depth.map(|d| d.attachment_info()),
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            },
        }
    }
}

/// Owns the attachment infos so the returned `VkRenderingInfo` can borrow them.
pub struct RenderingInfoBundle {
    color_attachments: [vk::RenderingAttachmentInfo<'static>; 1],
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        match &self.depth_attachment {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}
