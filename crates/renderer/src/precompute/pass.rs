//! Compute passes producing the lighting artifacts.
//!
//! Both cube passes share one pipeline (`prefilter.comp`): irradiance is the
//! same GGX importance-sampled convolution at roughness 1.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};

use vkframe_resources::{KtxHeader, KtxImage};
use vkframe_rhi::barrier::{self, compute_write_to_read};
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::{CommandBuffer, CommandPool, one_time_submit};
use vkframe_rhi::descriptor::{
    BindingWrite, BoundResource, DescriptorAllocator, DescriptorKind, DescriptorSetLayout,
    LayoutBinding, LayoutShape, write_set,
};
use vkframe_rhi::device::Device;
use vkframe_rhi::image::{Image, ImageDesc, ImageView, ViewDesc};
use vkframe_rhi::pipeline::{Pipeline, PipelineLayout, push_constant_range};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::vk;

use super::artifact::{ArtifactKind, BRDF_LUT_SIZE, SAMPLE_COUNT, dispatch_groups, roughness_for_mip};
use crate::error::{RendererError, RendererResult};
use crate::texture::{Texture, copy_regions, vk_format};

/// Push constants of `prefilter.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FilterPush {
    face: u32,
    mip_size: u32,
    roughness: f32,
    sample_count: u32,
}

/// Push constants of `brdf_lut.comp`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BrdfPush {
    size: u32,
    sample_count: u32,
}

/// How a filter pass picks the roughness of each mip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Roughness {
    /// Linear from 0 at mip 0 to 1 at the last mip.
    PerMip,
    Fixed(f32),
}

impl Roughness {
    fn for_mip(self, mip: u32, mip_count: u32) -> f32 {
        match self {
            Roughness::PerMip => roughness_for_mip(mip, mip_count),
            Roughness::Fixed(value) => value,
        }
    }
}

struct ComputeProgram {
    pipeline: Pipeline,
    layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
}

impl ComputeProgram {
    fn new(
        device: &Arc<Device>,
        shader_path: &Path,
        shape: LayoutShape,
        push: vk::PushConstantRange,
    ) -> RendererResult<Self> {
        let shader = Shader::from_spirv_file(device.clone(), shader_path, ShaderStage::Compute)?;
        let set_layout = DescriptorSetLayout::new(device.clone(), shape)?;
        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[push])?;
        let pipeline = Pipeline::compute(device.clone(), &shader, &layout)?;
        Ok(Self {
            pipeline,
            layout,
            set_layout,
        })
    }

    fn bind(&self, cmd: &CommandBuffer, set: vk::DescriptorSet) {
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, self.layout.handle(), 0, &[set]);
    }
}

/// Pipelines for the filter and BRDF passes.
pub struct PrecomputePasses {
    filter: ComputeProgram,
    brdf: ComputeProgram,
    device: Arc<Device>,
}

impl PrecomputePasses {
    /// Loads `prefilter.comp.spv` and `brdf_lut.comp.spv` from `shader_dir`.
    pub fn new(device: Arc<Device>, shader_dir: &Path) -> RendererResult<Self> {
        let compute = vk::ShaderStageFlags::COMPUTE;

        let filter = ComputeProgram::new(
            &device,
            &shader_dir.join("prefilter.comp.spv"),
            LayoutShape::new(vec![
                LayoutBinding {
                    binding: 0,
                    kind: DescriptorKind::CombinedImageSampler,
                    count: 1,
                    stages: compute,
                },
                LayoutBinding {
                    binding: 1,
                    kind: DescriptorKind::StorageImage,
                    count: 1,
                    stages: compute,
                },
            ])?,
            push_constant_range::<FilterPush>(compute),
        )?;

        let brdf = ComputeProgram::new(
            &device,
            &shader_dir.join("brdf_lut.comp.spv"),
            LayoutShape::new(vec![LayoutBinding {
                binding: 0,
                kind: DescriptorKind::StorageImage,
                count: 1,
                stages: compute,
            }])?,
            push_constant_range::<BrdfPush>(compute),
        )?;

        debug!("Precompute pipelines created");
        Ok(Self {
            filter,
            brdf,
            device,
        })
    }

    /// Runs the pass for `kind` and reads the result back.
    pub fn run(
        &self,
        kind: ArtifactKind,
        pool: &CommandPool,
        descriptors: &mut DescriptorAllocator,
        source: &Texture,
        source_face_size: u32,
    ) -> RendererResult<KtxImage> {
        let header = kind.expected_header(source_face_size);
        info!(
            "Running {} pass ({}x{}, {} mip(s), {} samples)",
            kind.label(),
            header.width,
            header.height,
            header.mip_levels,
            SAMPLE_COUNT
        );
        match kind {
            ArtifactKind::Irradiance => {
                self.filter_cube(pool, descriptors, source, header, Roughness::Fixed(1.0))
            }
            ArtifactKind::Prefiltered => {
                self.filter_cube(pool, descriptors, source, header, Roughness::PerMip)
            }
            ArtifactKind::BrdfLut => self.brdf_lut(pool, descriptors, header),
        }
    }

    /// Convolves `source` into a cube described by `header`, one storage
    /// view and one binding set per mip.
    pub fn filter_cube(
        &self,
        pool: &CommandPool,
        descriptors: &mut DescriptorAllocator,
        source: &Texture,
        header: KtxHeader,
        roughness: Roughness,
    ) -> RendererResult<KtxImage> {
        let image = Image::new(
            self.device.clone(),
            &ImageDesc::cube(
                "filtered_cube",
                header.width,
                header.mip_levels,
                vk_format(header.format),
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
        )?;

        let views = (0..header.mip_levels)
            .map(|mip| image.create_mip_view(mip))
            .collect::<Result<Vec<ImageView>, _>>()?;

        let mut sets = Vec::with_capacity(views.len());
        for view in &views {
            let set = descriptors.allocate(&self.filter.set_layout)?;
            write_set(
                &self.device,
                &self.filter.set_layout,
                set,
                &[
                    BindingWrite {
                        binding: 0,
                        resource: BoundResource::CombinedImageSampler {
                            sampler: source.sampler(),
                            view: source.view(),
                            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        },
                    },
                    BindingWrite {
                        binding: 1,
                        resource: BoundResource::StorageImage { view: view.handle() },
                    },
                ],
            )?;
            sets.push(set);
        }

        let readback = Buffer::new(
            self.device.clone(),
            BufferUsage::Readback,
            header.payload_size() as vk::DeviceSize,
        )?;
        let regions = copy_regions(&header);

        one_time_submit(&self.device, pool, |cmd| {
            barrier::transition(
                cmd,
                image.handle(),
                image.full_range(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
            )?;

            for (mip, set) in (0..header.mip_levels).zip(&sets) {
                let (mip_size, _) = header.mip_extent(mip);
                let groups = dispatch_groups(mip_size);
                self.filter.bind(cmd, *set);
                for face in 0..header.faces {
                    cmd.push_constants(
                        self.filter.layout.handle(),
                        vk::ShaderStageFlags::COMPUTE,
                        &FilterPush {
                            face,
                            mip_size,
                            roughness: roughness.for_mip(mip, header.mip_levels),
                            sample_count: SAMPLE_COUNT,
                        },
                    );
                    cmd.dispatch(groups, groups, 1);
                }
                compute_write_to_read(cmd, image.handle(), image.mip_range(mip));
            }

            read_back(cmd, &image, &readback, &regions)
        })?;

        finish_readback(header, &readback)
    }

    /// Integrates the split-sum BRDF into a 2D table.
    pub fn brdf_lut(
        &self,
        pool: &CommandPool,
        descriptors: &mut DescriptorAllocator,
        header: KtxHeader,
    ) -> RendererResult<KtxImage> {
        let extent = vk::Extent2D {
            width: header.width,
            height: header.height,
        };
        let image = Image::new(
            self.device.clone(),
            &ImageDesc::texture_2d(
                "brdf_lut",
                extent,
                vk_format(header.format),
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
        )?;
        let view = ImageView::new(
            self.device.clone(),
            &ViewDesc {
                image: image.handle(),
                view_type: vk::ImageViewType::TYPE_2D,
                format: image.format(),
                range: image.full_range(),
            },
        )?;

        let set = descriptors.allocate(&self.brdf.set_layout)?;
        write_set(
            &self.device,
            &self.brdf.set_layout,
            set,
            &[BindingWrite {
                binding: 0,
                resource: BoundResource::StorageImage { view: view.handle() },
            }],
        )?;

        let readback = Buffer::new(
            self.device.clone(),
            BufferUsage::Readback,
            header.payload_size() as vk::DeviceSize,
        )?;
        let regions = copy_regions(&header);
        let groups = dispatch_groups(BRDF_LUT_SIZE);

        one_time_submit(&self.device, pool, |cmd| {
            barrier::transition(
                cmd,
                image.handle(),
                image.full_range(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
            )?;
            self.brdf.bind(cmd, set);
            cmd.push_constants(
                self.brdf.layout.handle(),
                vk::ShaderStageFlags::COMPUTE,
                &BrdfPush {
                    size: BRDF_LUT_SIZE,
                    sample_count: SAMPLE_COUNT,
                },
            );
            cmd.dispatch(groups, groups, 1);
            read_back(cmd, &image, &readback, &regions)
        })?;

        finish_readback(header, &readback)
    }
}

fn read_back(
    cmd: &CommandBuffer,
    image: &Image,
    readback: &Buffer,
    regions: &[vk::BufferImageCopy],
) -> vkframe_rhi::RhiResult<()> {
    barrier::transition(
        cmd,
        image.handle(),
        image.full_range(),
        vk::ImageLayout::GENERAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    )?;
    cmd.copy_image_to_buffer(
        image.handle(),
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        readback.handle(),
        regions,
    );
    cmd.transfer_to_host_barrier();
    Ok(())
}

fn finish_readback(header: KtxHeader, readback: &Buffer) -> RendererResult<KtxImage> {
    let mut data = readback.read_data()?;
    if data.len() < header.payload_size() {
        return Err(RendererError::Precompute(format!(
            "readback holds {} bytes, expected {}",
            data.len(),
            header.payload_size()
        )));
    }
    data.truncate(header.payload_size());
    Ok(KtxImage::new(header, data)?)
}
