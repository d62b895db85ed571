//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ash::vk;
use lumenray_gpu::command::{begin_command_buffer, end_command_buffer, submit};
use lumenray_gpu::{GpuContextBuilder, GpuError};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::LumenApp;
use crate::context::AppContext;
use crate::frame::FrameContext;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lumenray".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Minimum wall time per frame, if a target rate is set.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a [`LumenApp`] until its window closes or it asks to exit.
///
/// Initializes logging from `RUST_LOG` (default `info`), creates the window
/// and GPU context, and drives the event loop.
pub fn run_app<A: LumenApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// What happens to a frame once its commands are submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameEnd {
    Present,
    /// Recording failed; the swapchain image may still be `UNDEFINED`.
    Discard,
}

impl FrameEnd {
    const fn after<T, E>(recorded: &Result<T, E>) -> Self {
        match recorded {
            Ok(_) => Self::Present,
            Err(_) => Self::Discard,
        }
    }

    /// Semaphore the submission signals for `present` to wait on.
    const fn present_signal(self, render_finished: vk::Semaphore) -> Option<vk::Semaphore> {
        match self {
            Self::Present => Some(render_finished),
            Self::Discard => None,
        }
    }
}

struct AppRunner<A: LumenApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

struct AppState<A: LumenApp> {
    ctx: AppContext,
    app: A,
    target_frame_time: Option<Duration>,
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl<A: LumenApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e:#}");
                    }
                    state.ctx.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, device_id: DeviceId, event: DeviceEvent) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let exit = self.state.as_ref().is_some_and(|state| state.app.should_exit());
        if exit {
            info!("Application requested exit");
            self.shutdown(event_loop);
        } else if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: LumenApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        // SAFETY: the window was just created and is kept alive by the context
        let mut ctx = unsafe { AppContext::new(window, Arc::new(gpu), self.config.vsync)? };

        let app = A::init(&mut ctx)?;

        Ok(AppState {
            ctx,
            app,
            target_frame_time: self.config.target_frame_time(),
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: LumenApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;
        if dt > 0.0 {
            let fps = 1.0 / f64::from(dt);
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }

        // The previous frame must be done before its descriptors and targets
        // are touched again.
        self.ctx.wait_for_frame()?;

        self.app.update(&self.ctx, dt);

        let device = self.ctx.gpu.device();
        let cmd = self.ctx.command_buffer;

        // SAFETY: the swapchain and semaphore belong to this context
        let acquired = unsafe {
            self.ctx
                .swapchain
                .acquire_next_image(&self.ctx.surface.swapchain_loader, self.ctx.sync.image_available)
        };
        let image_index = match acquired {
            Ok((index, _suboptimal)) => index,
            Err(GpuError::SwapchainOutOfDate) => {
                debug!("Swapchain out of date on acquire");
                let size = self.ctx.window.inner_size();
                return self.handle_resize(size.width, size.height);
            }
            Err(e) => return Err(e.into()),
        };

        // SAFETY: the previous submission has completed
        unsafe {
            self.ctx.sync.reset(device)?;
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }

        let mut frame = FrameContext::new(
            cmd,
            image_index,
            self.ctx.swapchain.images[image_index as usize],
            self.ctx.swapchain.extent,
            dt,
            self.ctx.frame_count,
        );
        let recorded = self.app.render(&self.ctx, &mut frame);

        // SAFETY: the command buffer is in the recording state
        unsafe { end_command_buffer(device, cmd)? };

        // The fence and `image_available` are consumed either way. A frame
        // whose recording failed is never presented.
        let end = FrameEnd::after(&recorded);
        // SAFETY: all handles belong to this context
        unsafe {
            submit(
                device,
                self.ctx.gpu.queue(),
                cmd,
                Some((self.ctx.sync.image_available, vk::PipelineStageFlags::TRANSFER)),
                end.present_signal(self.ctx.sync.render_finished),
                self.ctx.sync.in_flight,
            )?;
        }
        self.ctx.frame_count += 1;

        if let Err(e) = recorded {
            debug!("Frame {} discarded", self.ctx.frame_count - 1);
            return Err(e);
        }

        // SAFETY: the submission signals `render_finished`
        let needs_recreate = unsafe {
            self.ctx.swapchain.present(
                &self.ctx.surface.swapchain_loader,
                self.ctx.gpu.queue(),
                image_index,
                self.ctx.sync.render_finished,
            )?
        };

        if needs_recreate {
            let size = self.ctx.window.inner_size();
            self.handle_resize(size.width, size.height)?;
        }

        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.gpu.wait_idle()?;
        // SAFETY: the device is idle
        unsafe { self.ctx.recreate_swapchain(width, height)? };

        let extent = self.ctx.extent();
        self.app.on_resize(&mut self.ctx, extent.width, extent.height)?;

        info!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.ctx.frame_count > 0 {
            let avg_fps = self.fps_sum / self.ctx.frame_count as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", self.ctx.frame_count);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        self.app.cleanup(&mut self.ctx);

        // SAFETY: the device is idle and the app has released its objects
        unsafe { self.ctx.cleanup() };

        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = AppConfig::new("test")
            .with_size(320, 200)
            .with_target_fps(50)
            .with_vsync(true)
            .with_validation(false);
        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (320, 200));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn failed_recording_is_submitted_but_not_presented() {
        let failed: anyhow::Result<()> = Err(anyhow::anyhow!("allocation failed"));
        let end = FrameEnd::after(&failed);
        assert_eq!(end, FrameEnd::Discard);
        assert_eq!(end.present_signal(vk::Semaphore::null()), None);
    }

    #[test]
    fn recorded_frame_signals_present() {
        let end = FrameEnd::after(&Ok::<(), anyhow::Error>(()));
        assert_eq!(end, FrameEnd::Present);
        assert_eq!(
            end.present_signal(vk::Semaphore::null()),
            Some(vk::Semaphore::null())
        );
    }

    #[test]
    fn unlimited_fps_has_no_frame_time() {
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
    }
}
