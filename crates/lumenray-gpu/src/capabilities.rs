//! GPU capability detection.

use ash::vk;
use lumenray_core::constants::THREAD_GROUP_SIZE;
use std::ffi::CStr;

/// Format of the raw and accumulated render targets.
pub const RENDER_TARGET_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Capabilities relevant to the path tracing kernels.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,

    /// `scalarBlockLayout`; the sphere buffer is declared with `layout(scalar)`.
    pub supports_scalar_block_layout: bool,
    pub supports_synchronization2: bool,

    /// Render target format can be bound as a storage image.
    pub float_storage_image: bool,
    /// Render target format can be the source of a blit to the swapchain.
    pub float_blit_src: bool,

    pub device_local_memory_mb: u64,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_workgroup_invocations: u32,
    pub max_compute_workgroup_count: [u32; 3],
    pub max_push_constants_size: u32,
    pub max_storage_buffer_range: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let format_properties =
            instance.get_physical_device_format_properties(physical_device, RENDER_TARGET_FORMAT);

        let mut vulkan_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut vulkan_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan_1_2)
                .push_next(&mut vulkan_1_3);
            instance.get_physical_device_features2(physical_device, &mut features2);
        }

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let tiling = format_properties.optimal_tiling_features;
        let limits = properties.limits;

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned(),
            api_version: properties.api_version,
            supports_scalar_block_layout: vulkan_1_2.scalar_block_layout == vk::TRUE,
            supports_synchronization2: vulkan_1_3.synchronization2 == vk::TRUE,
            float_storage_image: tiling.contains(vk::FormatFeatureFlags::STORAGE_IMAGE),
            float_blit_src: tiling.contains(vk::FormatFeatureFlags::BLIT_SRC),
            device_local_memory_mb,
            max_compute_workgroup_size: limits.max_compute_work_group_size,
            max_compute_workgroup_invocations: limits.max_compute_work_group_invocations,
            max_compute_workgroup_count: limits.max_compute_work_group_count,
            max_push_constants_size: limits.max_push_constants_size,
            max_storage_buffer_range: limits.max_storage_buffer_range,
        }
    }

    /// Names of the requirements this device does not meet.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        let major = vk::api_version_major(self.api_version);
        let minor = vk::api_version_minor(self.api_version);
        if major < 1 || (major == 1 && minor < 3) {
            missing.push("Vulkan 1.3");
        }
        if !self.supports_scalar_block_layout {
            missing.push("scalarBlockLayout");
        }
        if !self.supports_synchronization2 {
            missing.push("synchronization2");
        }
        if !self.float_storage_image {
            missing.push("rgba32f storage images");
        }
        if !self.float_blit_src {
            missing.push("rgba32f blit source");
        }

        let group = THREAD_GROUP_SIZE;
        if self.max_compute_workgroup_size[0] < group
            || self.max_compute_workgroup_size[1] < group
            || self.max_compute_workgroup_invocations < group * group
        {
            missing.push("8x8 compute workgroups");
        }
        // Both kernels push 16 bytes.
        if self.max_push_constants_size < 16 {
            missing.push("16-byte push constants");
        }

        missing
    }

    /// Check if the GPU can run the path tracer.
    pub fn meets_requirements(&self) -> bool {
        self.missing_requirements().is_empty()
    }

    /// Largest dispatch, in thread groups, the device accepts per axis.
    pub fn max_dispatch(&self) -> (u32, u32) {
        (
            self.max_compute_workgroup_count[0],
            self.max_compute_workgroup_count[1],
        )
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}
