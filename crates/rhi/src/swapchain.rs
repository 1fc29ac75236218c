//! Swapchain management.
//!
//! A [`Swapchain`] owns one generation of presentable images, their views,
//! and the multisample color and depth [`RenderTargets`] sized to match.
//! Recreation replaces all of them together.
//!
//! Negotiation is split into pure helpers ([`negotiate`] and the
//! `choose_*` functions) so the policy can be checked without a surface:
//!
//! - Format: an sRGB 8-bit format with nonlinear sRGB color space, else the
//!   first reported format
//! - Present mode: `MAILBOX`, else `FIFO`
//! - Image count: `min_image_count + 1`, clamped to the surface maximum
//! - Extent: the surface's current extent, or the framebuffer size clamped
//!   to the surface limits when the surface leaves it to the application
//!
//! Acquire and present results are folded into [`AcquireOutcome`] and
//! [`PresentOutcome`]; only the stale-surface codes become outcomes, every
//! other failure is returned as an error.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::attachments::{
    DEPTH_FORMAT_CANDIDATES, RenderTargets, choose_depth_format, msaa_samples,
};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::ImageView;
use crate::instance::Instance;

/// 8-bit sRGB formats accepted without a warning, in preference order.
const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];

/// Surface support details.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Result of negotiating against a [`SurfaceSupport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// Picks format, present mode, extent and image count.
///
/// # Errors
///
/// [`RhiError::SwapchainError`] when the surface reports no formats or
/// present modes, or when the resulting extent has zero area.
pub fn negotiate(support: &SurfaceSupport, framebuffer: vk::Extent2D) -> RhiResult<Negotiated> {
    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "surface reports no formats or present modes".to_string(),
        ));
    }

    let extent = choose_extent(&support.capabilities, framebuffer);
    if extent.width == 0 || extent.height == 0 {
        return Err(RhiError::SwapchainError(format!(
            "surface extent {}x{} has zero area",
            extent.width, extent.height
        )));
    }

    Ok(Negotiated {
        surface_format: choose_surface_format(&support.formats),
        present_mode: choose_present_mode(&support.present_modes),
        extent,
        image_count: choose_image_count(&support.capabilities),
    })
}

/// Prefers an 8-bit sRGB format, else takes the first reported one.
///
/// `formats` must be non-empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for preferred in PREFERRED_FORMATS {
        if let Some(found) = formats.iter().find(|f| {
            f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            return *found;
        }
    }

    let fallback = formats.first().copied().unwrap_or_default();
    warn!(
        "No 8-bit sRGB surface format offered, falling back to {:?} / {:?}",
        fallback.format, fallback.color_space
    );
    fallback
}

/// `MAILBOX` when offered, otherwise `FIFO`, which is always available.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// One more than the minimum, clamped to the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// The surface's current extent, or `framebuffer` clamped to its limits
/// when the current extent is the `u32::MAX` sentinel.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// What `vkAcquireNextImageKHR` told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready. A suboptimal surface is still rendered to; the
    /// following present reports it.
    Acquired { index: u32, suboptimal: bool },
    /// The surface no longer matches; recreate before rendering.
    OutOfDate,
}

/// Folds an acquire result into an outcome. Errors other than
/// `ERROR_OUT_OF_DATE_KHR` pass through.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// What `vkQueuePresentKHR` told us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Suboptimal or out of date; recreate before the next frame.
    Stale,
}

/// Folds a present result into an outcome. Errors other than
/// `ERROR_OUT_OF_DATE_KHR` pass through.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
        Err(e) => Err(e.into()),
    }
}

/// Negotiated configuration of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
}

/// Swapchain creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    /// Owned by the caller and must outlive the swapchain.
    pub surface: vk::SurfaceKHR,
    /// Current framebuffer size of the window. Must be nonzero.
    pub framebuffer_extent: vk::Extent2D,
    /// MSAA sample count to aim for.
    pub requested_samples: u32,
}

/// Everything one generation owns.
struct Generation {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<ImageView>,
    targets: RenderTargets,
    config: SurfaceConfig,
}

/// Presentable images plus the attachments rendered into before resolve.
///
/// Single-writer: owned and mutated by the frame loop only.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<ImageView>,
    targets: Option<RenderTargets>,
    config: SurfaceConfig,
    generation: u64,
}

impl Swapchain {
    /// Creates the first generation.
    ///
    /// The depth format and sample count picked here are kept across
    /// recreations.
    pub fn new(instance: &Instance, device: Arc<Device>, desc: &SwapchainDesc) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let depth_format = choose_depth_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                device.supports_optimal_tiling(
                    format,
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                )
            },
        )?;
        let samples = msaa_samples(device.framebuffer_sample_counts(), desc.requested_samples);

        let generation = build_generation(
            &device,
            &surface_loader,
            &swapchain_loader,
            desc.surface,
            desc.framebuffer_extent,
            samples,
            depth_format,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            surface_loader,
            swapchain_loader,
            surface: desc.surface,
            swapchain: generation.swapchain,
            images: generation.images,
            views: generation.views,
            targets: Some(generation.targets),
            config: generation.config,
            generation: 0,
        })
    }

    /// Rebuilds every image, view and attachment for `framebuffer_extent`.
    ///
    /// Blocks until the device is idle. The old handle is passed to the
    /// driver as `old_swapchain` and destroyed as soon as the new one
    /// exists.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidArgument`] for a zero-area extent; the caller
    /// waits for a nonzero framebuffer before recreating.
    pub fn recreate(&mut self, framebuffer_extent: vk::Extent2D) -> RhiResult<()> {
        if framebuffer_extent.width == 0 || framebuffer_extent.height == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "cannot recreate swapchain at {}x{}",
                framebuffer_extent.width, framebuffer_extent.height
            )));
        }

        self.device.wait_idle()?;

        // Attachments and views go before the handle they were made for.
        self.targets = None;
        self.views.clear();

        let next = build_generation(
            &self.device,
            &self.surface_loader,
            &self.swapchain_loader,
            self.surface,
            framebuffer_extent,
            self.config.samples,
            self.config.depth_format,
            self.swapchain,
        )?;

        let old = std::mem::replace(&mut self.swapchain, next.swapchain);
        unsafe {
            self.swapchain_loader.destroy_swapchain(old, None);
        }
        self.images = next.images;
        self.views = next.views;
        self.targets = Some(next.targets);
        self.config = next.config;
        self.generation += 1;

        info!(
            "Swapchain recreated (generation {}): {}x{}",
            self.generation, self.config.extent.width, self.config.extent.height
        );
        Ok(())
    }

    /// Acquires the next image, signaling `signal` when it is ready.
    /// Waits without a timeout.
    pub fn acquire(&self, signal: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        })
    }

    /// Queues `index` for presentation once `wait` is signaled.
    pub fn present(&self, index: u32, wait: vk::Semaphore) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Presentable image at `index`, as returned by [`Swapchain::acquire`].
    pub fn image(&self, index: u32) -> RhiResult<vk::Image> {
        self.images
            .get(index as usize)
            .copied()
            .ok_or_else(|| RhiError::InvalidArgument(format!("no swapchain image {index}")))
    }

    pub fn image_view(&self, index: u32) -> RhiResult<vk::ImageView> {
        self.views
            .get(index as usize)
            .map(ImageView::handle)
            .ok_or_else(|| RhiError::InvalidArgument(format!("no swapchain view {index}")))
    }

    /// Attachments of the current generation.
    pub fn targets(&self) -> RhiResult<&RenderTargets> {
        self.targets
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("render targets missing".to_string()))
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.targets = None;
        self.views.clear();
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.config.extent.width,
            self.config.extent.height,
            self.images.len()
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn build_generation(
    device: &Arc<Device>,
    surface_loader: &ash::khr::surface::Instance,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    framebuffer_extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Generation> {
    let support = SurfaceSupport::query(device.physical_device(), surface, surface_loader)?;
    let negotiated = negotiate(&support, framebuffer_extent)?;

    let families = device.queue_families();
    let (Some(graphics), Some(present)) = (families.graphics_family, families.present_family)
    else {
        return Err(RhiError::SwapchainError(
            "device has no graphics or present family".to_string(),
        ));
    };
    let family_indices = [graphics, present];
    let (sharing_mode, shared_families) = if graphics != present {
        (vk::SharingMode::CONCURRENT, family_indices.as_slice())
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(negotiated.image_count)
        .image_format(negotiated.surface_format.format)
        .image_color_space(negotiated.surface_format.color_space)
        .image_extent(negotiated.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(shared_families)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(negotiated.present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

    let parts = (|| -> RhiResult<(Vec<vk::Image>, Vec<ImageView>, RenderTargets)> {
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        let views = images
            .iter()
            .map(|&image| {
                ImageView::color_2d(device.clone(), image, negotiated.surface_format.format)
            })
            .collect::<RhiResult<Vec<_>>>()?;
        let targets = RenderTargets::new(
            device,
            negotiated.extent,
            negotiated.surface_format.format,
            depth_format,
            samples,
        )?;
        Ok((images, views, targets))
    })();

    let (images, views, targets) = match parts {
        Ok(parts) => parts,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(e);
        }
    };

    info!(
        "Swapchain created: {}x{}, {:?}, {:?}, {} images",
        negotiated.extent.width,
        negotiated.extent.height,
        negotiated.surface_format.format,
        negotiated.present_mode,
        images.len()
    );

    Ok(Generation {
        swapchain,
        config: SurfaceConfig {
            format: negotiated.surface_format.format,
            color_space: negotiated.surface_format.color_space,
            extent: negotiated.extent,
            present_mode: negotiated.present_mode,
            image_count: images.len() as u32,
            samples,
            depth_format,
        },
        images,
        views,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn support(current: vk::Extent2D) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: current,
                min_image_extent: extent(1, 1),
                max_image_extent: extent(4096, 4096),
                ..Default::default()
            },
            formats: vec![
                format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_SRGB
        );
    }

    #[test]
    fn test_choose_surface_format_requires_nonlinear_space() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R16G16B16A16_SFLOAT
        );
    }

    #[test]
    fn test_choose_present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let caps = support(extent(1920, 1080)).capabilities;
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };
        assert_eq!(choose_extent(&caps, extent(3000, 3000)), extent(2000, 2000));
        assert_eq!(choose_extent(&caps, extent(50, 50)), extent(100, 100));
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(800, 600));
    }

    #[test]
    fn test_choose_image_count() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_negotiate_is_stable_for_unchanged_extent() {
        let support = support(extent(u32::MAX, u32::MAX));
        let first = negotiate(&support, extent(640, 480)).unwrap();
        let second = negotiate(&support, extent(640, 480)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.extent, extent(640, 480));
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn test_negotiate_rejects_zero_area() {
        let minimized = support(extent(0, 0));
        assert!(matches!(
            negotiate(&minimized, extent(640, 480)),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_negotiate_rejects_inadequate_surface() {
        let mut empty = support(extent(640, 480));
        empty.formats.clear();
        assert!(!empty.is_adequate());
        assert!(negotiate(&empty, extent(640, 480)).is_err());
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired {
                index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Acquired {
                index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(
            classify_present(Ok(false)).unwrap(),
            PresentOutcome::Presented
        );
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Stale
        );
        assert!(classify_present(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
