//! Progressive sphere path tracing for Lumenray.
//!
//! Each frame the [`PathTracer`]:
//! 1. derives camera, light and jitter uniforms ([`FrameParameterBuilder`])
//! 2. keeps the render targets at the output resolution ([`GpuResources`])
//! 3. serializes the scene when needed and dispatches the trace kernel
//!    ([`DispatchController`])
//! 4. shows the raw sample, or folds it into the running average while the
//!    camera and scene hold still ([`Compositor`])
//!
//! GPU work goes through a [`RenderBackend`]: [`VulkanBackend`] for real
//! devices, `backend::mock::MockBackend` (feature `mock`) for tests.

pub mod accumulate;
pub mod backend;
pub mod camera;
pub mod dispatch;
pub mod error;
pub mod frame_params;
pub mod light;
pub mod renderer;
pub mod resources;
pub mod screenshot;
pub mod settings;
pub mod sky;

pub use accumulate::{blend_pixels, blend_weight, CompositePass, Compositor, CompositorState, SampleCounter};
pub use backend::{Readback, RenderBackend, TargetRole, TraceBindings, VulkanBackend, VulkanFrame};
pub use camera::Camera;
pub use dispatch::{thread_groups, DispatchController, ThreadGroups};
pub use error::{RenderError, Result};
pub use frame_params::{FrameParameterBuilder, FrameParams, FrameUniforms, GpuFrameUniforms};
pub use light::DirectionalLight;
pub use renderer::{FrameReport, PathTracer, RenderStats};
pub use resources::{GpuResources, RenderTargets};
pub use screenshot::{save_capture, CaptureConfig, ScreenshotError};
pub use settings::{RenderMode, RenderSettings};
pub use sky::SkyImage;
