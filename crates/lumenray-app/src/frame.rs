//! Per-frame context for rendering.

use ash::vk;
use lumenray_render::VulkanFrame;

/// The frame being recorded.
pub struct FrameContext {
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    pub swapchain_image: vk::Image,
    pub extent: vk::Extent2D,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    pub frame_number: u64,
}

impl FrameContext {
    pub(crate) const fn new(
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        swapchain_image: vk::Image,
        extent: vk::Extent2D,
        dt: f32,
        frame_number: u64,
    ) -> Self {
        Self {
            command_buffer,
            image_index,
            swapchain_image,
            extent,
            dt,
            frame_number,
        }
    }

    /// The recording target handed to the path tracer's Vulkan backend.
    pub const fn vulkan_frame(&self) -> VulkanFrame {
        VulkanFrame {
            command_buffer: self.command_buffer,
            swapchain_image: self.swapchain_image,
            extent: self.extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_frame_carries_the_swapchain_target() {
        let frame = FrameContext::new(
            vk::CommandBuffer::null(),
            2,
            vk::Image::null(),
            vk::Extent2D {
                width: 640,
                height: 360,
            },
            0.016,
            9,
        );
        let vulkan = frame.vulkan_frame();
        assert_eq!(vulkan.extent.width, 640);
        assert_eq!(vulkan.extent.height, 360);
        assert_eq!(vulkan.swapchain_image, vk::Image::null());
    }
}
