//! Multisample color and depth attachments sized to the swapchain.
//!
//! Both attachments are single images shared by every frame slot. They
//! are created and destroyed together with the swapchain generation they
//! belong to; a recreation never keeps one and rebuilds the other.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, ImageView, ViewDesc};
use crate::physical_device::pick_sample_count;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first candidate for which `supported` holds.
///
/// # Errors
///
/// [`RhiError::UnsupportedFormat`] when no candidate qualifies. There is
/// no fallback; rendering without depth is not an option.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    features: vk::FormatFeatureFlags,
    supported: impl Fn(vk::Format) -> bool,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| supported(format))
        .ok_or_else(|| RhiError::UnsupportedFormat {
            candidates: candidates.to_vec(),
            features,
        })
}

/// Sample count for the attachments.
///
/// Multisampling is always on: if nothing between 2x and the request is
/// supported, 4x is used, which every conformant device offers for both
/// color and depth.
pub fn msaa_samples(supported: vk::SampleCountFlags, requested: u32) -> vk::SampleCountFlags {
    match pick_sample_count(supported, requested) {
        vk::SampleCountFlags::TYPE_1 => vk::SampleCountFlags::TYPE_4,
        samples => samples,
    }
}

/// Image plus its full view. The view is declared first so it drops first.
pub struct Attachment {
    view: ImageView,
    image: Image,
}

impl Attachment {
    fn new(device: &Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        let image = Image::new(device.clone(), desc)?;
        let view = ImageView::new(
            device.clone(),
            &ViewDesc {
                image: image.handle(),
                view_type: vk::ImageViewType::TYPE_2D,
                format: desc.format,
                range: image.full_range(),
            },
        )?;
        Ok(Self { view, image })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }
}

/// The multisample color target (resolved into the swapchain image) and
/// the depth target for one swapchain generation.
pub struct RenderTargets {
    color: Attachment,
    depth: Attachment,
    samples: vk::SampleCountFlags,
    extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn new(
        device: &Arc<Device>,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let color = Attachment::new(
            device,
            &ImageDesc {
                samples,
                ..ImageDesc::texture_2d(
                    "msaa_color",
                    extent,
                    color_format,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                )
            },
        )?;
        let depth = Attachment::new(
            device,
            &ImageDesc {
                samples,
                ..ImageDesc::texture_2d(
                    "depth",
                    extent,
                    depth_format,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                )
            },
        )?;

        info!(
            "Render targets created: {}x{}, {:?}, depth {:?}",
            extent.width, extent.height, samples, depth_format
        );

        Ok(Self {
            color,
            depth,
            samples,
            extent,
        })
    }

    #[inline]
    pub fn color(&self) -> &Attachment {
        &self.color
    }

    #[inline]
    pub fn depth(&self) -> &Attachment {
        &self.depth
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
