//! Draws a lighting cube behind the scene.

use std::path::Path;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::info;

use vkframe_renderer::{EnvironmentMaps, Renderer, RendererResult, Texture};
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::descriptor::{
    BindingWrite, BoundResource, DescriptorKind, DescriptorSetLayout, LayoutBinding, LayoutShape,
    write_set,
};
use vkframe_rhi::device::Device;
use vkframe_rhi::pipeline::{
    CullMode, DepthState, GraphicsPipelineDesc, Pipeline, PipelineLayout, push_constant_range,
};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::vk;
use vkframe_scene::Camera;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SkyboxPush {
    inverse_view_projection: Mat4,
    lod: f32,
    _pad: [f32; 3],
}

const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Which cube the skybox shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkyView {
    Prefiltered,
    Irradiance,
}

impl SkyView {
    pub fn toggled(self) -> Self {
        match self {
            SkyView::Prefiltered => SkyView::Irradiance,
            SkyView::Irradiance => SkyView::Prefiltered,
        }
    }
}

pub struct Skybox {
    pipeline: Pipeline,
    layout: PipelineLayout,
    prefiltered_set: vk::DescriptorSet,
    irradiance_set: vk::DescriptorSet,
    _set_layout: DescriptorSetLayout,
    prefiltered_mips: u32,
    view: SkyView,
    lod: f32,
}

impl Skybox {
    pub fn new(renderer: &mut Renderer, maps: &EnvironmentMaps, shader_dir: &Path) -> RendererResult<Self> {
        let device = renderer.device().clone();
        let surface = *renderer.surface_config();

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("skybox.vert.spv"),
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("skybox.frag.spv"),
            ShaderStage::Fragment,
        )?;

        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            LayoutShape::new(vec![LayoutBinding {
                binding: 0,
                kind: DescriptorKind::CombinedImageSampler,
                count: 1,
                stages: vk::ShaderStageFlags::FRAGMENT,
            }])?,
        )?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[set_layout.handle()],
            &[push_constant_range::<SkyboxPush>(PUSH_STAGES)],
        )?;
        let pipeline = Pipeline::graphics(
            device.clone(),
            &GraphicsPipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                color_format: surface.format,
                depth_format: Some(surface.depth_format),
                samples: surface.samples,
                cull_mode: CullMode::None,
                depth: DepthState::BACKGROUND,
            },
            &layout,
        )?;

        let prefiltered_set = bind_cube(renderer, &device, &set_layout, &maps.prefiltered)?;
        let irradiance_set = bind_cube(renderer, &device, &set_layout, &maps.irradiance)?;

        info!("Skybox ready ({:?})", surface.samples);

        Ok(Self {
            pipeline,
            layout,
            prefiltered_set,
            irradiance_set,
            _set_layout: set_layout,
            prefiltered_mips: maps.prefiltered.mip_levels(),
            view: SkyView::Prefiltered,
            lod: 0.0,
        })
    }

    pub fn toggle_view(&mut self) {
        self.view = self.view.toggled();
        info!("Skybox shows {:?}", self.view);
    }

    /// Steps the prefiltered mip shown, wrapping back to the sharpest.
    pub fn next_lod(&mut self) {
        self.lod = next_lod(self.lod, self.prefiltered_mips);
        info!("Skybox roughness level {}", self.lod);
    }

    pub fn draw(&self, cmd: &CommandBuffer, camera: &Camera) {
        let (set, lod) = match self.view {
            SkyView::Prefiltered => (self.prefiltered_set, self.lod),
            SkyView::Irradiance => (self.irradiance_set, 0.0),
        };
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(self.pipeline.bind_point(), self.layout.handle(), 0, &[set]);
        cmd.push_constants(
            self.layout.handle(),
            PUSH_STAGES,
            &SkyboxPush {
                inverse_view_projection: camera.inverse_view_rotation_projection(),
                lod,
                _pad: [0.0; 3],
            },
        );
        cmd.draw(3, 1);
    }
}

fn bind_cube(
    renderer: &mut Renderer,
    device: &Arc<Device>,
    layout: &DescriptorSetLayout,
    texture: &Texture,
) -> RendererResult<vk::DescriptorSet> {
    let set = renderer.allocate_set(layout)?;
    write_set(
        device,
        layout,
        set,
        &[BindingWrite {
            binding: 0,
            resource: BoundResource::CombinedImageSampler {
                sampler: texture.sampler(),
                view: texture.view(),
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        }],
    )?;
    Ok(set)
}

fn next_lod(lod: f32, mip_levels: u32) -> f32 {
    let next = lod + 1.0;
    if next >= mip_levels as f32 { 0.0 } else { next }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_layout() {
        assert_eq!(std::mem::size_of::<SkyboxPush>(), 80);
    }

    #[test]
    fn test_lod_wraps() {
        assert_eq!(next_lod(0.0, 3), 1.0);
        assert_eq!(next_lod(2.0, 3), 0.0);
        assert_eq!(next_lod(0.0, 1), 0.0);
    }

    #[test]
    fn test_toggle_round_trips() {
        assert_eq!(SkyView::Prefiltered.toggled().toggled(), SkyView::Prefiltered);
    }
}
