//! GPU images and image views.
//!
//! [`Image`] owns a VkImage plus its gpu-allocator memory. [`ImageView`]
//! owns a VkImageView over any image, including swapchain images the
//! renderer does not own.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of mip levels in a full chain for the given size:
/// `floor(log2(max(w, h))) + 1`.
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Whether the format carries a stencil component.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Whether the format is a depth or depth/stencil format.
pub fn is_depth(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Aspect mask a full-image barrier or view must use for `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth(format) {
        if has_stencil(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Image creation parameters.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    /// 6 for cubemaps.
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    /// Sets `CUBE_COMPATIBLE`; requires `array_layers == 6`.
    pub cube: bool,
}

impl ImageDesc {
    /// Single-mip, single-layer, single-sample 2D image.
    pub fn texture_2d(
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name,
            extent,
            format,
            usage,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            cube: false,
        }
    }

    /// Six-face cube image with `mip_levels` levels.
    pub fn cube(
        name: &'static str,
        face_size: u32,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name,
            extent: vk::Extent2D {
                width: face_size,
                height: face_size,
            },
            format,
            usage,
            mip_levels,
            array_layers: 6,
            samples: vk::SampleCountFlags::TYPE_1,
            cube: true,
        }
    }

    fn validate(&self) -> RhiResult<()> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "image '{}' has zero extent",
                self.name
            )));
        }
        if self.cube && self.array_layers != 6 {
            return Err(RhiError::InvalidArgument(format!(
                "cube image '{}' must have 6 layers, got {}",
                self.name, self.array_layers
            )));
        }
        let max_mips = full_mip_count(self.extent.width, self.extent.height);
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(RhiError::InvalidArgument(format!(
                "image '{}' mip count {} outside 1..={}",
                self.name, self.mip_levels, max_mips
            )));
        }
        Ok(())
    }
}

/// Device-local image with allocator-managed memory.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        desc.validate()?;

        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device
            .allocator()
            .and_then(|mut allocator| {
                Ok(allocator.allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })?)
            })
            .inspect_err(|_| unsafe { device.handle().destroy_image(image, None) })?;

        let image = Self {
            device,
            image,
            allocation: Some(allocation),
            desc: *desc,
        };
        if let Some(allocation) = &image.allocation {
            unsafe {
                image.device.handle().bind_image_memory(
                    image.image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!(
            "Created image '{}': {}x{} {:?}, {} mip(s), {} layer(s), {:?}",
            desc.name,
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.mip_levels,
            desc.array_layers,
            desc.samples
        );

        Ok(image)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn array_layers(&self) -> u32 {
        self.desc.array_layers
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.desc.format)
    }

    /// Subresource range covering every mip and layer.
    pub fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: 0,
            level_count: self.desc.mip_levels,
            base_array_layer: 0,
            layer_count: self.desc.array_layers,
        }
    }

    /// Subresource range covering one mip across every layer.
    pub fn mip_range(&self, mip: u32) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: 0,
            layer_count: self.desc.array_layers,
        }
    }

    /// View over the whole image: `CUBE` for cube images, `TYPE_2D` otherwise.
    pub fn create_default_view(&self) -> RhiResult<ImageView> {
        let view_type = if self.desc.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        ImageView::new(
            self.device.clone(),
            &ViewDesc {
                image: self.image,
                view_type,
                format: self.desc.format,
                range: self.full_range(),
            },
        )
    }

    /// Storage view of one mip level across all layers, as a 2D array.
    pub fn create_mip_view(&self, mip: u32) -> RhiResult<ImageView> {
        if mip >= self.desc.mip_levels {
            return Err(RhiError::InvalidArgument(format!(
                "mip {} out of range for image '{}' with {} mip(s)",
                mip, self.desc.name, self.desc.mip_levels
            )));
        }
        ImageView::new(
            self.device.clone(),
            &ViewDesc {
                image: self.image,
                view_type: vk::ImageViewType::TYPE_2D_ARRAY,
                format: self.desc.format,
                range: self.mip_range(mip),
            },
        )
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking image allocation: {}", e),
            }
        }
        debug!("Destroyed image '{}'", self.desc.name);
    }
}

/// View creation parameters.
#[derive(Clone, Copy, Debug)]
pub struct ViewDesc {
    pub image: vk::Image,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
}

/// Owned VkImageView.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    pub fn new(device: Arc<Device>, desc: &ViewDesc) -> RhiResult<Self> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(desc.image)
            .view_type(desc.view_type)
            .format(desc.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(desc.range);

        let view = unsafe { device.handle().create_image_view(&create_info, None)? };
        Ok(Self { device, view })
    }

    /// Single-mip 2D color view, as used for swapchain images.
    pub fn color_2d(device: Arc<Device>, image: vk::Image, format: vk::Format) -> RhiResult<Self> {
        Self::new(
            device,
            &ViewDesc {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            },
        )
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_count() {
        assert_eq!(full_mip_count(512, 512), 10);
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(640, 480), 10);
        assert_eq!(full_mip_count(1024, 16), 11);
        assert_eq!(full_mip_count(0, 0), 1);
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::B8G8R8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_desc_validation() {
        let usage = vk::ImageUsageFlags::SAMPLED;
        let cube = ImageDesc::cube("env", 512, 10, vk::Format::R32G32B32A32_SFLOAT, usage);
        assert!(cube.validate().is_ok());

        let too_many_mips = ImageDesc { mip_levels: 11, ..cube };
        assert!(too_many_mips.validate().is_err());

        let bad_cube = ImageDesc {
            array_layers: 1,
            ..cube
        };
        assert!(bad_cube.validate().is_err());

        let empty = ImageDesc::texture_2d(
            "empty",
            vk::Extent2D {
                width: 0,
                height: 4,
            },
            vk::Format::R8G8B8A8_UNORM,
            usage,
        );
        assert!(empty.validate().is_err());
    }
}
