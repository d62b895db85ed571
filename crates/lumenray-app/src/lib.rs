//! Application framework for Lumenray.
//!
//! Handles the boilerplate every windowed tracer needs:
//! - Window creation and management
//! - GPU context initialization
//! - Swapchain creation and recreation
//! - Frame synchronization (one frame in flight)
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use lumenray_app::{run_app, AppConfig, AppContext, FrameContext, LumenApp};
//!
//! struct MyApp;
//!
//! impl LumenApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &mut FrameContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod frame;
mod runner;

pub use app::LumenApp;
pub use context::AppContext;
pub use frame::FrameContext;
pub use runner::{run_app, AppConfig};

pub use lumenray_gpu::{GpuContext, GpuContextBuilder};
pub use lumenray_render::Camera;
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
