//! Vulkan instance creation and device selection.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Surface extensions needed to present to a window on this platform.
pub fn surface_instance_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
    ]
}

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance.
///
/// Headless instances skip the surface extensions so they can run on
/// machines without a display server.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
    presentable: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|_| GpuError::InvalidState("application name contains NUL".to_string()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Lumenray")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    #[cfg_attr(not(target_os = "macos"), allow(unused_mut))]
    let mut extensions = if presentable {
        surface_instance_extensions()
    } else {
        Vec::new()
    };
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME);
    let extension_names: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut layer_names = Vec::new();
    if enable_validation {
        let available = entry.enumerate_instance_layer_properties()?;
        let found = available
            .iter()
            .any(|props| CStr::from_ptr(props.layer_name.as_ptr()) == VALIDATION_LAYER);
        if found {
            layer_names.push(VALIDATION_LAYER.as_ptr());
        } else {
            tracing::warn!("Validation layer {:?} not available", VALIDATION_LAYER);
        }
    }

    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    Ok(entry.create_instance(&create_info, None)?)
}

/// Pick the physical device best suited to compute path tracing.
///
/// Devices that fail [`GpuCapabilities::meets_requirements`] or lack a queue
/// family with both graphics and compute are skipped.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, GpuCapabilities, u32)> {
    let mut best: Option<(i64, vk::PhysicalDevice, GpuCapabilities, u32)> = None;

    for device in instance.enumerate_physical_devices()? {
        let capabilities = GpuCapabilities::query(instance, device);
        let missing = capabilities.missing_requirements();
        if !missing.is_empty() {
            tracing::debug!(
                "Skipping {}: missing {}",
                capabilities.device_name,
                missing.join(", ")
            );
            continue;
        }
        let Some(queue_family) = find_universal_queue_family(instance, device) else {
            tracing::debug!("Skipping {}: no graphics+compute queue", capabilities.device_name);
            continue;
        };

        let properties = instance.get_physical_device_properties(device);
        let score = score_device(properties.device_type, capabilities.device_local_memory_mb);
        if best.as_ref().map_or(true, |(s, ..)| score > *s) {
            best = Some((score, device, capabilities, queue_family));
        }
    }

    best.map(|(_, device, capabilities, family)| (device, capabilities, family))
        .ok_or(GpuError::NoSuitableDevice)
}

/// Find a queue family that can both dispatch compute work and blit.
unsafe fn find_universal_queue_family(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Option<u32> {
    instance
        .get_physical_device_queue_family_properties(device)
        .iter()
        .position(|family| {
            family
                .queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map(|index| index as u32)
}

fn score_device(device_type: vk::PhysicalDeviceType, vram_mb: u64) -> i64 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };
    type_score + (vram_mb / 1024) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_beats_integrated() {
        let discrete = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let integrated = score_device(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert!(discrete > integrated);
    }

    #[test]
    fn vram_breaks_ties() {
        let small = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let large = score_device(vk::PhysicalDeviceType::DISCRETE_GPU, 12288);
        assert!(large > small);
    }
}
