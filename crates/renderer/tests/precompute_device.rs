//! Precompute and synchronization on a real Vulkan device.
//!
//! Every test returns early on machines without a driver, and the
//! precompute test also needs the compiled shaders under `shaders/spirv`.

use std::path::PathBuf;
use std::sync::Arc;

use vkframe_core::{DescriptorConfig, PrecomputeConfig};
use vkframe_renderer::precompute::{
    ArtifactCache, ArtifactKind, EnvironmentMaps, SAMPLE_COUNT, prepare_environment,
};
use vkframe_renderer::renderer::pool_capacity;
use vkframe_resources::{Cubemap, KtxImage};
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::descriptor::DescriptorAllocator;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::{Instance, InstanceDesc};
use vkframe_rhi::physical_device::select_headless_physical_device;
use vkframe_rhi::sync::SyncSet;

/// Field order is drop order: the device goes before its instance.
struct Gpu {
    device: Arc<Device>,
    _instance: Instance,
}

fn headless_gpu() -> Option<Gpu> {
    let instance = Instance::new(&InstanceDesc {
        app_name: c"vkframe-test",
        enable_validation: false,
        surface_extensions: &[],
    })
    .ok()?;
    let physical_device = select_headless_physical_device(instance.handle()).ok()?;
    let device = Device::new(&instance, &physical_device).ok()?;
    Some(Gpu {
        device,
        _instance: instance,
    })
}

fn shader_dir() -> Option<PathBuf> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shaders/spirv");
    ["prefilter.comp.spv", "brdf_lut.comp.spv"]
        .iter()
        .all(|name| dir.join(name).exists())
        .then_some(dir)
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vkframe-device-{}-{}", name, std::process::id()))
}

/// Reads back every artifact the last run stored.
fn stored_artifacts(cache: &ArtifactCache, source: &Cubemap) -> Vec<KtxImage> {
    let digest = source.digest(SAMPLE_COUNT);
    ArtifactKind::ALL
        .iter()
        .map(|&kind| {
            cache
                .lookup(
                    kind,
                    &kind.expected_header(source.face_size()),
                    &kind.expected_digest(&digest),
                )
                .unwrap_or_else(|miss| panic!("{} not stored: {miss}", kind.label()))
        })
        .collect()
}

#[test]
fn precompute_is_idempotent_and_cached() {
    let Some(gpu) = headless_gpu() else {
        eprintln!("no Vulkan device, skipping");
        return;
    };
    let Some(shaders) = shader_dir() else {
        eprintln!("shaders/spirv not compiled, skipping");
        return;
    };
    let device = &gpu.device;
    let pool = CommandPool::new_transient(device.clone(), device.graphics_family()).unwrap();
    let descriptor_config = DescriptorConfig::default();
    let mut descriptors = DescriptorAllocator::new(
        device.clone(),
        pool_capacity(&descriptor_config),
        descriptor_config.initial_sets,
    )
    .unwrap();

    let dir = temp_dir("precompute");
    let _ = std::fs::remove_dir_all(&dir);
    let cache = ArtifactCache::new(&dir);
    let source = Cubemap::procedural_sky(16);
    let mut config = PrecomputeConfig {
        cache_dir: dir.clone(),
        ..PrecomputeConfig::default()
    };
    let mut run = |config: &PrecomputeConfig| -> EnvironmentMaps {
        prepare_environment(device, &pool, &mut descriptors, config, &source, &shaders).unwrap()
    };

    let first = run(&config);
    assert_eq!(first.recomputed, ArtifactKind::ALL.to_vec());
    let first_artifacts = stored_artifacts(&cache, &source);

    let cached = run(&config);
    assert!(cached.recomputed.is_empty(), "second run recomputed {:?}", cached.recomputed);

    config.force = true;
    let forced = run(&config);
    assert_eq!(forced.recomputed, ArtifactKind::ALL.to_vec());
    let second_artifacts = stored_artifacts(&cache, &source);

    let prefiltered = ArtifactKind::Prefiltered.expected_header(source.face_size());
    for maps in [&first, &cached, &forced] {
        assert_eq!(maps.prefiltered.mip_levels(), prefiltered.mip_levels);
        assert_eq!(maps.irradiance.mip_levels(), 1);
    }

    for (kind, (a, b)) in ArtifactKind::ALL
        .iter()
        .zip(first_artifacts.iter().zip(&second_artifacts))
    {
        assert_eq!(a.header(), b.header(), "{} header changed", kind.label());
        assert_eq!(*a.header(), kind.expected_header(source.face_size()));
        for mip in 0..a.header().mip_levels {
            let (x, y) = (a.mean_luminance(mip), b.mean_luminance(mip));
            assert!(x.is_finite() && x > 0.0, "{} mip {mip} is black", kind.label());
            assert!(
                (x - y).abs() <= 1e-3 * x.max(1.0),
                "{} mip {mip}: {x} vs {y}",
                kind.label()
            );
        }
    }

    drop((first, cached, forced));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn slot_fence_starts_signaled() {
    let Some(gpu) = headless_gpu() else {
        eprintln!("no Vulkan device, skipping");
        return;
    };
    let sync = SyncSet::new(gpu.device.clone()).unwrap();
    assert!(sync.in_flight().is_signaled().unwrap());
    sync.in_flight().wait_forever().unwrap();

    sync.in_flight().reset().unwrap();
    assert!(!sync.in_flight().is_signaled().unwrap());
}
