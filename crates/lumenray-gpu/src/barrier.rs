//! Image layout transitions between the frame's compute and transfer passes.

use crate::memory::color_subresource_range;
use ash::vk;

/// One synchronization2 image barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl ImageTransition {
    /// Freshly created render target to storage-image use.
    pub fn init_storage(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::GENERAL,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }

    /// Kernel writes must land before the next kernel reads them.
    pub fn compute_to_compute(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::GENERAL,
            src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }

    /// Accumulated target ready to be blitted or copied out.
    pub fn compute_to_transfer_src(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_READ,
        }
    }

    /// Return the accumulated target to storage use after the transfer.
    pub fn transfer_src_to_compute(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: vk::ImageLayout::GENERAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_READ,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_READ
                | vk::AccessFlags2::SHADER_STORAGE_WRITE,
        }
    }

    /// Swapchain image (or sky upload target) ready to receive a transfer.
    pub fn undefined_to_transfer_dst(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
        }
    }

    /// Blit destination handed to the presentation engine.
    pub fn transfer_dst_to_present(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }

    /// Uploaded sky texture made readable by the trace kernel.
    pub fn transfer_dst_to_sampled(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        }
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(color_subresource_range())
    }
}

/// Record a batch of transitions as one pipeline barrier.
///
/// # Safety
/// The command buffer must be recording and every image must be valid.
pub unsafe fn record(device: &ash::Device, cmd: vk::CommandBuffer, transitions: &[ImageTransition]) {
    if transitions.is_empty() {
        return;
    }
    let barriers: Vec<_> = transitions.iter().map(ImageTransition::to_vk).collect();
    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_chain_layouts_line_up() {
        let image = vk::Image::null();
        let chain = [
            ImageTransition::init_storage(image),
            ImageTransition::compute_to_compute(image),
            ImageTransition::compute_to_transfer_src(image),
            ImageTransition::transfer_src_to_compute(image),
        ];
        for pair in chain.windows(2) {
            assert_eq!(pair[0].new_layout, pair[1].old_layout);
        }
        assert_eq!(chain[3].new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn compute_to_compute_orders_writes_before_reads() {
        let t = ImageTransition::compute_to_compute(vk::Image::null());
        assert!(t.src_access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));
        assert!(t.dst_access.contains(vk::AccessFlags2::SHADER_STORAGE_READ));
        assert_eq!(t.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    #[test]
    fn present_transition_ends_in_present_layout() {
        let acquire = ImageTransition::undefined_to_transfer_dst(vk::Image::null());
        let release = ImageTransition::transfer_dst_to_present(vk::Image::null());
        assert_eq!(acquire.new_layout, release.old_layout);
        assert_eq!(release.to_vk().new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }
}
