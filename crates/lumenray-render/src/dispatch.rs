//! Trace kernel dispatch.

use lumenray_core::constants::THREAD_GROUP_SIZE;
use tracing::trace;

use crate::backend::{RenderBackend, TraceBindings};
use crate::error::{RenderError, Result};
use crate::frame_params::GpuFrameUniforms;
use crate::resources::GpuResources;

/// Workgroup counts for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadGroups {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Workgroups covering a `width`×`height` image with 8×8 groups.
///
/// Edge groups are partial; the kernel discards out-of-bounds invocations.
pub fn thread_groups(width: u32, height: u32) -> Result<ThreadGroups> {
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyResolution { width, height });
    }
    Ok(ThreadGroups {
        x: width.div_ceil(THREAD_GROUP_SIZE),
        y: height.div_ceil(THREAD_GROUP_SIZE),
        z: 1,
    })
}

/// Issues the trace dispatch once every binding is current.
#[derive(Debug, Default)]
pub struct DispatchController {
    dispatches: u64,
}

impl DispatchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches submitted so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Record one trace dispatch writing into the `raw` target.
    ///
    /// Fails without recording anything if the scene buffer or the render
    /// targets are missing or sized for a different resolution.
    pub fn dispatch<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        frame: &mut B::Frame,
        resources: &GpuResources<B>,
        uniforms: &GpuFrameUniforms,
        width: u32,
        height: u32,
    ) -> Result<ThreadGroups> {
        let groups = thread_groups(width, height)?;

        if resources.target_size() != Some((width, height)) {
            return Err(RenderError::Backend(format!(
                "render targets {:?} do not match output {width}x{height}",
                resources.target_size()
            )));
        }
        let (Some(scene), Some(targets)) = (resources.scene_buffer(), resources.targets()) else {
            return Err(RenderError::Backend(
                "dispatch before resources were allocated".to_string(),
            ));
        };

        let bindings: TraceBindings<'_, B> = TraceBindings {
            scene,
            sphere_count: resources.sphere_count(),
            raw: &targets.raw,
            width,
            height,
        };
        backend.dispatch_trace(frame, &bindings, uniforms, groups)?;
        self.dispatches += 1;

        trace!(
            "Dispatched {}x{} groups for {} spheres",
            groups.x,
            groups.y,
            bindings.sphere_count
        );
        Ok(groups)
    }
}
