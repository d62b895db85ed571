//! CPU stand-in for a GPU backend.
//!
//! Records every call in an ordered [`MockEvent`] log, keeps buffer bytes and
//! target pixels in host memory, and runs blends with
//! [`blend_pixels`](crate::accumulate::blend_pixels). Trace dispatches fill
//! the raw target with a programmable per-dispatch sample.

use std::collections::HashMap;

use super::{Readback, RenderBackend, TargetRole, TraceBindings};
use crate::accumulate::blend_pixels;
use crate::dispatch::ThreadGroups;
use crate::error::{RenderError, Result};
use crate::frame_params::GpuFrameUniforms;
use crate::sky::SkyImage;

/// One backend call, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    CreateBuffer { id: u64, size: u64 },
    WriteBuffer { id: u64, len: usize },
    ReleaseBuffer { id: u64 },
    CreateTarget { id: u64, role: TargetRole, width: u32, height: u32 },
    ReleaseTarget { id: u64 },
    UploadSky { width: u32, height: u32 },
    Dispatch { target: u64, sphere_count: u32, groups: ThreadGroups, real_time: bool },
    Blend { weight: f32 },
    Present { target: u64 },
    Readback { target: u64 },
    Destroy,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockBuffer {
    id: u64,
}

impl MockBuffer {
    pub const fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockTarget {
    id: u64,
    width: u32,
    height: u32,
}

impl MockTarget {
    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Produces the colour written by the `n`th dispatch.
pub type SampleFn = Box<dyn FnMut(&GpuFrameUniforms, u64) -> [f32; 4]>;

pub struct MockBackend {
    extent: (u32, u32),
    next_id: u64,
    events: Vec<MockEvent>,
    buffers: HashMap<u64, Vec<u8>>,
    targets: HashMap<u64, Vec<[f32; 4]>>,
    sample: SampleFn,
    dispatches: u64,
    presented: Option<Vec<[f32; 4]>>,
    pending_readback: Option<Readback>,
    fail_allocations: bool,
    failing_release: Option<u64>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A 16x16 backend whose dispatches write mid grey.
    pub fn new() -> Self {
        Self {
            extent: (16, 16),
            next_id: 1,
            events: Vec::new(),
            buffers: HashMap::new(),
            targets: HashMap::new(),
            sample: Box::new(|_, _| [0.5, 0.5, 0.5, 1.0]),
            dispatches: 0,
            presented: None,
            pending_readback: None,
            fail_allocations: false,
            failing_release: None,
        }
    }

    #[must_use]
    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.extent = (width, height);
        self
    }

    #[must_use]
    pub fn with_sample(mut self, sample: impl FnMut(&GpuFrameUniforms, u64) -> [f32; 4] + 'static) -> Self {
        self.sample = Box::new(sample);
        self
    }

    /// Change the output resolution reported for later frames.
    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.extent = (width, height);
    }

    /// Make every later allocation fail as if device memory ran out.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Make releasing the object with `id` fail. The object stays live.
    pub fn fail_release_of(&mut self, id: u64) {
        self.failing_release = Some(id);
    }

    fn check_release(&self, id: u64) -> Result<()> {
        if self.failing_release == Some(id) {
            return Err(RenderError::Backend(format!("mock release failure for {id}")));
        }
        Ok(())
    }

    pub fn events(&self) -> &[MockEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn count(&self, matches: impl Fn(&MockEvent) -> bool) -> usize {
        self.events.iter().filter(|e| matches(e)).count()
    }

    pub fn targets_created(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::CreateTarget { .. }))
    }

    pub fn targets_released(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::ReleaseTarget { .. }))
    }

    pub fn buffers_created(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::CreateBuffer { .. }))
    }

    pub fn buffers_released(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::ReleaseBuffer { .. }))
    }

    /// Targets and buffers that were created and not yet released.
    pub fn live_resources(&self) -> usize {
        self.targets.len() + self.buffers.len()
    }

    /// Weights of every blend so far.
    pub fn blend_weights(&self) -> Vec<f32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Blend { weight } => Some(*weight),
                _ => None,
            })
            .collect()
    }

    /// Pixels shown by the most recent present.
    pub fn presented(&self) -> Option<&[[f32; 4]]> {
        self.presented.as_deref()
    }

    /// Bytes last written to a buffer.
    pub fn buffer_bytes(&self, buffer: &MockBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer.id).map(Vec::as_slice)
    }

    fn allocate_id(&mut self) -> Result<u64> {
        if self.fail_allocations {
            return Err(RenderError::Gpu(lumenray_gpu::GpuError::AllocationFailed(
                "mock allocation failure".to_string(),
            )));
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    fn pixels(&self, target: &MockTarget) -> Result<&Vec<[f32; 4]>> {
        self.targets
            .get(&target.id)
            .ok_or_else(|| RenderError::Backend(format!("unknown target {}", target.id)))
    }
}

impl RenderBackend for MockBackend {
    type Buffer = MockBuffer;
    type Target = MockTarget;
    type Frame = ();

    fn frame_extent(&self, _: &()) -> (u32, u32) {
        self.extent
    }

    fn create_buffer(&mut self, size: u64) -> Result<MockBuffer> {
        let id = self.allocate_id()?;
        self.buffers.insert(id, vec![0; size as usize]);
        self.events.push(MockEvent::CreateBuffer { id, size });
        Ok(MockBuffer { id })
    }

    fn write_buffer(&mut self, buffer: &mut MockBuffer, bytes: &[u8]) -> Result<()> {
        let storage = self
            .buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| RenderError::Backend(format!("write to unknown buffer {}", buffer.id)))?;
        if bytes.len() > storage.len() {
            return Err(RenderError::Backend(format!(
                "write of {} bytes overflows buffer of {}",
                bytes.len(),
                storage.len()
            )));
        }
        storage[..bytes.len()].copy_from_slice(bytes);
        self.events.push(MockEvent::WriteBuffer {
            id: buffer.id,
            len: bytes.len(),
        });
        Ok(())
    }

    fn release_buffer(&mut self, buffer: MockBuffer) -> Result<()> {
        self.check_release(buffer.id)?;
        if self.buffers.remove(&buffer.id).is_none() {
            return Err(RenderError::Backend(format!("double release of buffer {}", buffer.id)));
        }
        self.events.push(MockEvent::ReleaseBuffer { id: buffer.id });
        Ok(())
    }

    fn create_target(&mut self, role: TargetRole, width: u32, height: u32) -> Result<MockTarget> {
        let id = self.allocate_id()?;
        self.targets
            .insert(id, vec![[0.0; 4]; (width * height) as usize]);
        self.events.push(MockEvent::CreateTarget {
            id,
            role,
            width,
            height,
        });
        Ok(MockTarget { id, width, height })
    }

    fn release_target(&mut self, target: MockTarget) -> Result<()> {
        self.check_release(target.id)?;
        if self.targets.remove(&target.id).is_none() {
            return Err(RenderError::Backend(format!("double release of target {}", target.id)));
        }
        self.events.push(MockEvent::ReleaseTarget { id: target.id });
        Ok(())
    }

    fn upload_sky(&mut self, sky: &SkyImage) -> Result<()> {
        self.events.push(MockEvent::UploadSky {
            width: sky.width,
            height: sky.height,
        });
        Ok(())
    }

    fn dispatch_trace(
        &mut self,
        _: &mut (),
        bindings: &TraceBindings<'_, Self>,
        uniforms: &GpuFrameUniforms,
        groups: ThreadGroups,
    ) -> Result<()> {
        if !self.buffers.contains_key(&bindings.scene.id) {
            return Err(RenderError::Backend("dispatch with released scene buffer".to_string()));
        }
        let colour = (self.sample)(uniforms, self.dispatches);
        let raw = self
            .targets
            .get_mut(&bindings.raw.id)
            .ok_or_else(|| RenderError::Backend("dispatch into released target".to_string()))?;
        raw.fill(colour);
        self.dispatches += 1;
        self.events.push(MockEvent::Dispatch {
            target: bindings.raw.id,
            sphere_count: bindings.sphere_count,
            groups,
            real_time: uniforms.real_time != 0,
        });
        Ok(())
    }

    fn blend(
        &mut self,
        _: &mut (),
        raw: &MockTarget,
        accumulated: &MockTarget,
        weight: f32,
    ) -> Result<()> {
        let samples = self.pixels(raw)?.clone();
        let acc = self
            .targets
            .get_mut(&accumulated.id)
            .ok_or_else(|| RenderError::Backend("blend into released target".to_string()))?;
        blend_pixels(acc, &samples, weight);
        self.events.push(MockEvent::Blend { weight });
        Ok(())
    }

    fn present(&mut self, _: &mut (), source: &MockTarget) -> Result<()> {
        self.presented = Some(self.pixels(source)?.clone());
        self.events.push(MockEvent::Present { target: source.id });
        Ok(())
    }

    fn record_readback(&mut self, _: &mut (), source: &MockTarget) -> Result<()> {
        self.pending_readback = Some(Readback {
            width: source.width,
            height: source.height,
            pixels: self.pixels(source)?.clone(),
        });
        self.events.push(MockEvent::Readback { target: source.id });
        Ok(())
    }

    fn take_readback(&mut self) -> Result<Option<Readback>> {
        Ok(self.pending_readback.take())
    }

    fn destroy(&mut self) -> Result<()> {
        self.events.push(MockEvent::Destroy);
        Ok(())
    }
}
