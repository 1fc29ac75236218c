//! Vulkan instance management.
//!
//! Creates the `VkInstance`, optionally with the Khronos validation layer and a
//! debug messenger that forwards driver diagnostics into `tracing`.

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance creation parameters.
#[derive(Clone, Copy, Debug)]
pub struct InstanceDesc<'a> {
    /// Reported to the driver as the application name.
    pub app_name: &'a CStr,
    /// Request the validation layer. Silently skipped when not installed.
    pub enable_validation: bool,
    /// Surface extensions required by the windowing system.
    pub surface_extensions: &'a [&'a CStr],
}

/// Vulkan instance wrapper with optional validation layer support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance targeting API 1.3.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, a required
    /// extension is missing, or the debug messenger cannot be created.
    pub fn new(desc: &InstanceDesc<'_>) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation_available =
            desc.enable_validation && Self::is_validation_layer_available(&entry)?;
        if desc.enable_validation && !validation_available {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(desc.app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkframe")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let extensions = required_extensions(desc.surface_extensions, validation_available);
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let layers = if validation_available {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created (API 1.3, {} extension(s))",
            extensions.len()
        );

        let (debug_utils, debug_messenger) = if validation_available {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            info!("Validation layers enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name == VALIDATION_LAYER_NAME
        }))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Instance extensions to enable: the surface set plus debug utils when
/// validation is on, without duplicates.
fn required_extensions<'a>(surface: &[&'a CStr], validation: bool) -> Vec<&'a CStr> {
    let mut extensions: Vec<&CStr> = Vec::with_capacity(surface.len() + 2);
    if !surface.contains(&ash::khr::surface::NAME) {
        extensions.push(ash::khr::surface::NAME);
    }
    for &ext in surface {
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    if validation && !extensions.contains(&ash::ext::debug_utils::NAME) {
        extensions.push(ash::ext::debug_utils::NAME);
    }
    extensions
}

/// Forwards validation layer messages to `tracing`.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message)
        }
        _ => info!("[Vulkan {}] {}", type_str, message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_extensions_always_has_surface() {
        let extensions = required_extensions(&[], false);
        assert_eq!(extensions, vec![ash::khr::surface::NAME]);
    }

    #[test]
    fn test_required_extensions_dedups() {
        let surface = [ash::khr::surface::NAME, ash::khr::xlib_surface::NAME];
        let extensions = required_extensions(&surface, true);
        assert_eq!(
            extensions,
            vec![
                ash::khr::surface::NAME,
                ash::khr::xlib_surface::NAME,
                ash::ext::debug_utils::NAME
            ]
        );
    }

    #[test]
    fn test_instance_creation_without_validation() {
        let desc = InstanceDesc {
            app_name: c"vkframe-test",
            enable_validation: false,
            surface_extensions: &[],
        };
        // Machines without a Vulkan driver skip this check.
        if let Ok(instance) = Instance::new(&desc) {
            assert!(!instance.has_validation());
        }
    }
}
