//! Image-based-lighting precompute.
//!
//! Runs once at startup. Produces three artifacts from a source cubemap:
//! - irradiance: diffuse convolution, one mip
//! - prefiltered: specular convolution, roughness rising with mip index
//! - BRDF lookup table: split-sum integration, independent of the source
//!
//! Every artifact is persisted as KTX under the cache directory and reused
//! on the next run while the source digest and header still match.

pub mod artifact;
pub mod cache;
pub mod pass;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use vkframe_core::PrecomputeConfig;
use vkframe_resources::{Cubemap, KtxImage};
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::descriptor::DescriptorAllocator;
use vkframe_rhi::device::Device;

pub use artifact::{ArtifactKind, DIGEST_KEY, SAMPLE_COUNT};
pub use cache::{ArtifactCache, CacheMiss};
pub use pass::PrecomputePasses;

use crate::error::RendererResult;
use crate::texture::Texture;

/// Sampled textures for image-based lighting.
pub struct EnvironmentMaps {
    pub irradiance: Texture,
    pub prefiltered: Texture,
    pub brdf_lut: Texture,
    /// Artifacts computed on this run rather than loaded from the cache.
    pub recomputed: Vec<ArtifactKind>,
}

/// Loads cached artifacts, computes the missing ones, and uploads all
/// three.
pub fn prepare_environment(
    device: &Arc<Device>,
    pool: &CommandPool,
    descriptors: &mut DescriptorAllocator,
    config: &PrecomputeConfig,
    source: &Cubemap,
    shader_dir: &Path,
) -> RendererResult<EnvironmentMaps> {
    let face_size = source.face_size();
    let digest = source.digest(SAMPLE_COUNT);
    let cache = ArtifactCache::new(&config.cache_dir);

    let mut artifacts: Vec<(ArtifactKind, Option<KtxImage>)> = ArtifactKind::ALL
        .iter()
        .map(|&kind| {
            let cached = if config.force {
                None
            } else {
                cache.load(
                    kind,
                    &kind.expected_header(face_size),
                    &kind.expected_digest(&digest),
                )
            };
            (kind, cached)
        })
        .collect();

    let recomputed: Vec<ArtifactKind> = artifacts
        .iter()
        .filter(|(_, a)| a.is_none())
        .map(|(kind, _)| *kind)
        .collect();
    let missing = recomputed.len();
    if missing > 0 {
        info!(
            "Precomputing {} of {} lighting artifact(s) from a {}x{} source",
            missing,
            artifacts.len(),
            face_size,
            face_size
        );
        let passes = PrecomputePasses::new(device.clone(), shader_dir)?;
        let source_texture = Texture::from_ktx(device, pool, "environment", &source.to_ktx()?)?;

        for (kind, slot) in artifacts.iter_mut().filter(|(_, a)| a.is_none()) {
            let image = passes
                .run(*kind, pool, descriptors, &source_texture, face_size)?
                .with_key_value(DIGEST_KEY, &kind.expected_digest(&digest));
            cache.store(*kind, &image)?;
            *slot = Some(image);
        }
        info!("Precompute finished");
    } else {
        info!("All lighting artifacts loaded from '{}'", cache.dir().display());
    }

    let mut textures = Vec::with_capacity(artifacts.len());
    for (kind, image) in artifacts {
        let Some(image) = image else {
            continue;
        };
        info!(
            "{}: {}x{}, {} mip(s), mean luminance {:.4}",
            kind.label(),
            image.header().width,
            image.header().height,
            image.header().mip_levels,
            image.mean_luminance(0)
        );
        textures.push(Texture::from_ktx(device, pool, kind.label(), &image)?);
    }

    let [irradiance, prefiltered, brdf_lut]: [Texture; 3] = textures
        .try_into()
        .map_err(|_| crate::RendererError::Precompute("missing artifact".to_string()))?;

    Ok(EnvironmentMaps {
        irradiance,
        prefiltered,
        brdf_lut,
        recomputed,
    })
}
