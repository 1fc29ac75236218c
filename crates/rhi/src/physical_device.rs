//! Physical device (GPU) selection.
//!
//! This module handles GPU enumeration and selection based on capabilities.
//!
//! # Overview
//!
//! The physical device selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Checking each GPU for required queue families (Graphics, Present)
//! 3. Verifying required device features
//! 4. Selecting the most suitable GPU (preferring discrete GPUs)
//!
//! Also holds the multisample count negotiation, which only depends on
//! device limits.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices the renderer needs.
///
/// Graphics families also run the precompute dispatches, so there is no
/// separate compute or transfer family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// Information about a physical device (GPU).
///
/// This struct contains all the information needed to create a logical device
/// and perform rendering operations.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns the device type (Discrete, Integrated, etc.).
    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.properties.device_type
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// This function enumerates all available GPUs and selects one based on:
/// 1. Required queue family support (graphics and present)
/// 2. Required feature support (sampler anisotropy)
/// 3. Device type preference (discrete GPU preferred)
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface for present support checking
/// * `surface_loader` - The surface extension loader
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no suitable GPU is found.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    select_with(instance, |device| {
        find_queue_families(instance, device, surface, surface_loader)
    })
}

/// Selects a GPU for offscreen work such as the lighting precompute.
///
/// No surface exists, so the present family mirrors the graphics family;
/// a device picked this way must never be handed to a swapchain.
pub fn select_headless_physical_device(
    instance: &ash::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    select_with(instance, |device| {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let caps: Vec<FamilyCaps> = families
            .iter()
            .map(|family| FamilyCaps {
                queue_count: family.queue_count,
                graphics_compute: family
                    .queue_flags
                    .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
                present: false,
            })
            .collect();
        headless_families(pick_queue_families(&caps))
    })
}

fn headless_families(picked: QueueFamilyIndices) -> QueueFamilyIndices {
    QueueFamilyIndices {
        graphics_family: picked.graphics_family,
        present_family: picked.graphics_family,
    }
}

fn select_with<F>(instance: &ash::Instance, queue_families: F) -> Result<PhysicalDeviceInfo, RhiError>
where
    F: Fn(vk::PhysicalDevice) -> QueueFamilyIndices,
{
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    // Collect all suitable devices with their scores
    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();

    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, queue_families(device)) {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            suitable_devices.push((info, score));
        }
    }

    if suitable_devices.is_empty() {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    }

    // Sort by score (highest first) and pick the best one
    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let (selected_device, score) = suitable_devices.remove(0);

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected_device)
}

/// Checks if a physical device is suitable for rendering.
///
/// Returns `Some(PhysicalDeviceInfo)` if the device meets all requirements,
/// or `None` if it doesn't.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    if !supports_swapchain(instance, device) {
        debug!("GPU '{}' skipped: VK_KHR_swapchain not supported", device_name);
        return None;
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!(
            "GPU '{}' skipped: sampler anisotropy not supported",
            device_name
        );
        return None;
    }

    if properties.api_version < vk::API_VERSION_1_3 {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

/// Finds graphics and present families, preferring one family that does both.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let caps: Vec<FamilyCaps> = families
        .iter()
        .enumerate()
        .map(|(i, family)| FamilyCaps {
            queue_count: family.queue_count,
            graphics_compute: family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            present: unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i as u32, surface)
                    .unwrap_or(false)
            },
        })
        .collect();

    pick_queue_families(&caps)
}

/// What a queue family can do, as far as selection cares.
#[derive(Clone, Copy, Debug)]
struct FamilyCaps {
    queue_count: u32,
    graphics_compute: bool,
    present: bool,
}

fn pick_queue_families(families: &[FamilyCaps]) -> QueueFamilyIndices {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, f)| f.queue_count > 0)
            .map(|(i, f)| (i as u32, *f))
    };

    if let Some((i, _)) = usable().find(|(_, f)| f.graphics_compute && f.present) {
        return QueueFamilyIndices {
            graphics_family: Some(i),
            present_family: Some(i),
        };
    }

    QueueFamilyIndices {
        graphics_family: usable().find(|(_, f)| f.graphics_compute).map(|(i, _)| i),
        present_family: usable().find(|(_, f)| f.present).map(|(i, _)| i),
    }
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) })
    else {
        return false;
    };
    extensions.iter().any(|ext| {
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    })
}

/// Rates a physical device; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        _ => 1,
    };
    let vram_mb = (info.device_local_memory() / (1024 * 1024)).min(16_000) as u32;
    type_score + info.properties.limits.max_image_dimension2_d + vram_mb
}

/// Sample counts in descending order.
const SAMPLE_COUNTS: [vk::SampleCountFlags; 7] = [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
    vk::SampleCountFlags::TYPE_1,
];

/// Picks the highest sample count in `supported` that does not exceed
/// `requested`.
///
/// `TYPE_1` is always supported, so this never fails.
pub fn pick_sample_count(
    supported: vk::SampleCountFlags,
    requested: u32,
) -> vk::SampleCountFlags {
    SAMPLE_COUNTS
        .into_iter()
        .find(|&count| count.as_raw() <= requested && supported.contains(count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(queue_count: u32, graphics_compute: bool, present: bool) -> FamilyCaps {
        FamilyCaps {
            queue_count,
            graphics_compute,
            present,
        }
    }

    #[test]
    fn test_queue_family_indices_incomplete() {
        assert!(!QueueFamilyIndices::default().is_complete());
        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!graphics_only.is_complete());
    }

    #[test]
    fn test_headless_families_share_graphics() {
        let families = [caps(0, true, false), caps(2, true, false)];
        let picked = headless_families(pick_queue_families(&families));
        assert!(picked.is_complete());
        assert_eq!(picked.unique_families(), vec![1]);

        let none = headless_families(pick_queue_families(&[caps(1, false, false)]));
        assert!(!none.is_complete());
    }

    #[test]
    fn test_unique_families() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(2),
            present_family: Some(1),
        };
        assert_eq!(split.unique_families(), vec![2, 1]);
    }

    #[test]
    fn test_prefers_combined_family() {
        let families = [
            caps(1, true, false),
            caps(1, false, true),
            caps(1, true, true),
        ];
        let indices = pick_queue_families(&families);
        assert_eq!(indices.graphics_family, Some(2));
        assert_eq!(indices.present_family, Some(2));
    }

    #[test]
    fn test_split_families_and_empty_queues() {
        let families = [
            caps(0, true, true),
            caps(4, true, false),
            caps(1, false, true),
        ];
        let indices = pick_queue_families(&families);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_pick_sample_count_clamps_to_request() {
        let supported = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        assert_eq!(pick_sample_count(supported, 4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(pick_sample_count(supported, 64), vk::SampleCountFlags::TYPE_8);
    }

    #[test]
    fn test_pick_sample_count_falls_back() {
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2;
        assert_eq!(pick_sample_count(supported, 8), vk::SampleCountFlags::TYPE_2);
        assert_eq!(
            pick_sample_count(vk::SampleCountFlags::empty(), 4),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
