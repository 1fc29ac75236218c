//! Sampled GPU textures uploaded from KTX images.

use std::sync::Arc;

use tracing::debug;

use vkframe_resources::{KtxHeader, KtxImage, PixelFormat};
use vkframe_rhi::barrier;
use vkframe_rhi::buffer::Buffer;
use vkframe_rhi::command::{CommandPool, one_time_submit};
use vkframe_rhi::device::Device;
use vkframe_rhi::image::{Image, ImageDesc, ImageView};
use vkframe_rhi::sampler::Sampler;
use vkframe_rhi::vk;

use crate::error::RendererResult;

/// Vulkan format holding `format` texels.
pub fn vk_format(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::Rgba16F => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::Rgba32F => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// Buffer regions are aligned to the texel block size Vulkan requires for
/// every format used here.
const REGION_ALIGNMENT: usize = 4;

/// Where one (mip, face) region sits in a staging buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagingRegion {
    pub mip: u32,
    pub face: u32,
    pub offset: usize,
    pub size: usize,
}

/// Staging layout of a KTX payload: mip-major, then face, each region
/// starting on a 4-byte boundary.
pub fn staging_regions(header: &KtxHeader) -> Vec<StagingRegion> {
    let mut regions = Vec::with_capacity((header.mip_levels * header.faces) as usize);
    let mut offset: usize = 0;
    for mip in 0..header.mip_levels {
        let size = header.face_size(mip);
        for face in 0..header.faces {
            offset = offset.next_multiple_of(REGION_ALIGNMENT);
            regions.push(StagingRegion {
                mip,
                face,
                offset,
                size,
            });
            offset += size;
        }
    }
    regions
}

/// One buffer/image copy per staging region.
pub fn copy_regions(header: &KtxHeader) -> Vec<vk::BufferImageCopy> {
    staging_regions(header)
        .into_iter()
        .map(|region| {
            let (width, height) = header.mip_extent(region.mip);
            vk::BufferImageCopy {
                buffer_offset: region.offset as vk::DeviceSize,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: region.mip,
                    base_array_layer: region.face,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            }
        })
        .collect()
}

/// An image with a full view and a linear sampler, in
/// `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

impl Texture {
    /// Uploads every mip and face of `ktx`. Six-face images become cube
    /// textures.
    pub fn from_ktx(
        device: &Arc<Device>,
        pool: &CommandPool,
        name: &'static str,
        ktx: &KtxImage,
    ) -> RendererResult<Self> {
        let header = ktx.header();
        let format = vk_format(header.format);
        let usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;

        let desc = if header.faces == 6 {
            ImageDesc::cube(name, header.width, header.mip_levels, format, usage)
        } else {
            ImageDesc {
                mip_levels: header.mip_levels,
                ..ImageDesc::texture_2d(
                    name,
                    vk::Extent2D {
                        width: header.width,
                        height: header.height,
                    },
                    format,
                    usage,
                )
            }
        };
        let image = Image::new(device.clone(), &desc)?;

        let staging = Buffer::new_upload(device.clone(), ktx.data())?;
        let regions = copy_regions(header);
        let range = image.full_range();

        one_time_submit(device, pool, |cmd| {
            barrier::transition(
                cmd,
                image.handle(),
                range,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
            barrier::transition(
                cmd,
                image.handle(),
                range,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        let view = image.create_default_view()?;
        let sampler = Sampler::linear_clamp(device.clone(), header.mip_levels as f32)?;

        debug!(
            "Uploaded texture '{}' ({}x{}, {} mip(s), {} face(s))",
            name, header.width, header.height, header.mip_levels, header.faces
        );

        Ok(Self {
            sampler,
            view,
            image,
        })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regions_follow_payload_layout() {
        let header = KtxHeader {
            format: PixelFormat::Rgba32F,
            width: 8,
            height: 8,
            mip_levels: 4,
            faces: 6,
            array_layers: 1,
        };
        let regions = copy_regions(&header);
        assert_eq!(regions.len(), 24);

        // Mip-major, then face.
        assert_eq!(regions[0].buffer_offset, 0);
        assert_eq!(regions[1].buffer_offset, 8 * 8 * 16);
        assert_eq!(regions[6].image_subresource.mip_level, 1);
        assert_eq!(regions[6].buffer_offset, 6 * 8 * 8 * 16);
        assert_eq!(regions[23].image_extent.width, 1);
        assert_eq!(regions[23].image_subresource.base_array_layer, 5);

        let last = regions[23].buffer_offset as usize + header.face_size(3);
        assert_eq!(last, header.payload_size());
    }

    #[test]
    fn test_staging_matches_ktx_payload() {
        let header = KtxHeader {
            format: PixelFormat::Rgba16F,
            width: 32,
            height: 32,
            mip_levels: 6,
            faces: 6,
            array_layers: 1,
        };
        let regions = staging_regions(&header);
        for region in &regions {
            assert_eq!(region.offset % 4, 0);
            assert_eq!(region.offset, header.region_offset(region.mip, 0, region.face));
        }
        let last = regions.last().unwrap();
        assert_eq!(last.offset + last.size, header.payload_size());
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(vk_format(PixelFormat::Rgba16F), vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(vk_format(PixelFormat::Rgba32F), vk::Format::R32G32B32A32_SFLOAT);
    }
}
