//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use lumenray_gpu::swapchain::Swapchain;
use lumenray_gpu::sync::FrameSync;
use lumenray_gpu::{CommandPool, GpuContext, SurfaceContext};
use winit::window::Window;

/// Application context shared across all app methods.
///
/// Holds exactly one command buffer and one set of sync primitives: each
/// frame's accumulated image depends on the previous frame's, so frames are
/// never overlapped.
pub struct AppContext {
    pub window: Arc<Window>,
    /// Shared with the path tracer's backend.
    pub gpu: Arc<GpuContext>,
    pub surface: SurfaceContext,
    pub swapchain: Swapchain,
    pub command_pool: CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    pub(crate) sync: FrameSync,
    /// Total frames submitted.
    pub frame_count: u64,
    pub(crate) last_frame_time: Instant,
    pub vsync: bool,
}

impl AppContext {
    /// # Safety
    /// The window must have valid handles and outlive the context.
    pub(crate) unsafe fn new(window: Arc<Window>, gpu: Arc<GpuContext>, vsync: bool) -> anyhow::Result<Self> {
        // SAFETY: caller guarantees the window handles are valid
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: the surface was created from this GPU context
        let swapchain = unsafe { surface.create_swapchain(&gpu, width, height, vsync, None)? };

        tracing::info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.format
        );

        let device = gpu.device();
        // SAFETY: device and queue family are valid
        let (command_pool, command_buffer, sync) = unsafe {
            let pool = CommandPool::new(device, gpu.queue_family())?;
            let cmd = pool.allocate(device)?;
            (pool, cmd, FrameSync::new(device)?)
        };

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            command_pool,
            command_buffer,
            sync,
            frame_count: 0,
            last_frame_time: Instant::now(),
            vsync,
        })
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub const fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    pub const fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    /// Block until the last submitted frame has finished on the GPU.
    pub fn wait_for_frame(&self) -> anyhow::Result<()> {
        // SAFETY: the fence belongs to this device
        unsafe { self.sync.wait(self.gpu.device())? };
        Ok(())
    }

    /// Recreate the swapchain for a new window size.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        // SAFETY: caller guarantees the GPU is idle
        unsafe {
            self.surface
                .recreate_swapchain(&self.gpu, &mut self.swapchain, width, height, self.vsync)?;
        }

        tracing::info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        Ok(())
    }

    /// # Safety
    /// The GPU must be idle and nothing created here may still be in use.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.gpu.device();

        // SAFETY: caller guarantees the GPU is idle
        unsafe {
            self.sync.destroy(device);
            self.command_pool.destroy(device);
            self.swapchain.destroy(&self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}
