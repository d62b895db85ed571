//! Fence and semaphores for the single frame in flight.

use crate::error::Result;
use ash::vk;

/// Every frame's accumulated image depends on the previous frame's, so the
/// renderer never overlaps frames and one set of primitives suffices.
pub struct FrameSync {
    /// Signaled by acquire once the swapchain image may be written.
    pub image_available: vk::Semaphore,
    /// Signaled by the frame's submission; present waits on it.
    pub render_finished: vk::Semaphore,
    /// Signaled when the frame's command buffer has completed. Created
    /// signaled so the first wait returns immediately.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        // SAFETY: caller guarantees the device is valid
        unsafe {
            let image_available = device.create_semaphore(&semaphore_info, None)?;
            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(e.into());
                }
            };
            let in_flight = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                    return Err(e.into());
                }
            };
            Ok(Self {
                image_available,
                render_finished,
                in_flight,
            })
        }
    }

    /// Block until the previous frame finished on the GPU.
    ///
    /// # Safety
    /// `device` must be the device these objects were created on.
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        // SAFETY: caller guarantees the fence belongs to `device`
        unsafe { device.wait_for_fences(&[self.in_flight], true, u64::MAX)? };
        Ok(())
    }

    /// # Safety
    /// `device` must be the device these objects were created on, and the
    /// fence must not be pending.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        // SAFETY: caller guarantees the fence is not pending
        unsafe { device.reset_fences(&[self.in_flight])? };
        Ok(())
    }

    /// # Safety
    /// Nothing may still be waiting on these objects.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: caller guarantees the objects are idle
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight, None);
        }
    }
}
