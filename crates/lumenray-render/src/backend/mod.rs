//! GPU backends the path tracer records into.
//!
//! [`RenderBackend`] is the seam between frame orchestration and the device.
//! [`VulkanBackend`] drives the real kernels. `mock::MockBackend` keeps
//! everything on the CPU and logs each call so lifecycle rules can be tested;
//! it is built for this crate's tests and behind the `mock` feature.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod vulkan;

pub use vulkan::{VulkanBackend, VulkanFrame};

use crate::dispatch::ThreadGroups;
use crate::error::Result;
use crate::frame_params::GpuFrameUniforms;
use crate::sky::SkyImage;

/// Which of the two render targets an image is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetRole {
    /// Output of a single trace dispatch.
    Raw,
    /// Running average across progressive samples.
    Accumulated,
}

impl TargetRole {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw_target",
            Self::Accumulated => "accumulated_target",
        }
    }
}

/// Everything the trace kernel reads and writes in one dispatch.
pub struct TraceBindings<'a, B: RenderBackend + ?Sized> {
    pub scene: &'a B::Buffer,
    pub sphere_count: u32,
    pub raw: &'a B::Target,
    pub width: u32,
    pub height: u32,
}

/// Linear RGBA pixels copied back from a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 4]>,
}

/// Device operations needed to render one progressive frame.
///
/// Handles are moved into the release calls so a released resource cannot
/// be used again.
pub trait RenderBackend {
    /// Structured buffer holding the sphere records.
    type Buffer;
    /// A float RGBA image the size of the output.
    type Target;
    /// Per-frame recording state (a command buffer and a display image).
    type Frame;

    /// Output resolution of `frame`.
    fn frame_extent(&self, frame: &Self::Frame) -> (u32, u32);

    fn create_buffer(&mut self, size: u64) -> Result<Self::Buffer>;
    fn write_buffer(&mut self, buffer: &mut Self::Buffer, bytes: &[u8]) -> Result<()>;
    fn release_buffer(&mut self, buffer: Self::Buffer) -> Result<()>;

    fn create_target(&mut self, role: TargetRole, width: u32, height: u32) -> Result<Self::Target>;
    fn release_target(&mut self, target: Self::Target) -> Result<()>;

    /// Replace the environment texture sampled by escaped rays.
    fn upload_sky(&mut self, sky: &SkyImage) -> Result<()>;

    /// Run the trace kernel into `bindings.raw`.
    fn dispatch_trace(
        &mut self,
        frame: &mut Self::Frame,
        bindings: &TraceBindings<'_, Self>,
        uniforms: &GpuFrameUniforms,
        groups: ThreadGroups,
    ) -> Result<()>;

    /// `accumulated = raw * weight + accumulated * (1 - weight)`, ordered
    /// after the preceding dispatch.
    fn blend(
        &mut self,
        frame: &mut Self::Frame,
        raw: &Self::Target,
        accumulated: &Self::Target,
        weight: f32,
    ) -> Result<()>;

    /// Show `source` on the display surface.
    fn present(&mut self, frame: &mut Self::Frame, source: &Self::Target) -> Result<()>;

    /// Copy `source` to host memory once `frame` completes.
    fn record_readback(&mut self, frame: &mut Self::Frame, source: &Self::Target) -> Result<()>;

    /// Pixels from the last completed readback, if any.
    fn take_readback(&mut self) -> Result<Option<Readback>>;

    /// Release backend-owned objects (pipelines, sky, uniforms).
    fn destroy(&mut self) -> Result<()>;
}
