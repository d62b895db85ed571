//! Scene buffer and render target lifecycle.

use lumenray_core::GpuRecord;
use tracing::{debug, warn};

use crate::backend::{RenderBackend, TargetRole};
use crate::error::{RenderError, Result};

/// The `raw` / `accumulated` target pair, always the same size.
#[derive(Debug)]
pub struct RenderTargets<T> {
    pub raw: T,
    pub accumulated: T,
    pub width: u32,
    pub height: u32,
}

impl<T> RenderTargets<T> {
    /// Release both targets, even if the first release fails. Returns the
    /// first error.
    fn release_with<B>(self, backend: &mut B) -> Result<()>
    where
        B: RenderBackend<Target = T>,
    {
        let raw = backend.release_target(self.raw);
        let accumulated = backend.release_target(self.accumulated);
        raw.and(accumulated)
    }
}

/// Scene record count as the `u32` the kernel reads.
fn record_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| RenderError::TooManyRecords(len))
}

#[derive(Debug)]
struct SceneBuffer<Buf> {
    buffer: Buf,
    count: usize,
    stride: u64,
    /// Records written by the last upload.
    written: u32,
}

/// Owns the scene buffer and the render targets.
///
/// Every allocation goes through the backend, and every reallocation releases
/// the previous object before creating its replacement. Dropping the manager
/// does not release anything; call [`GpuResources::release`].
pub struct GpuResources<B: RenderBackend> {
    scene: Option<SceneBuffer<B::Buffer>>,
    targets: Option<RenderTargets<B::Target>>,
    reallocations: u64,
}

impl<B: RenderBackend> Default for GpuResources<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: RenderBackend> GpuResources<B> {
    pub fn new() -> Self {
        Self {
            scene: None,
            targets: None,
            reallocations: 0,
        }
    }

    /// Make sure the scene buffer holds `count` records of `record_stride`
    /// bytes, where `record_stride` must be `R`'s true size.
    ///
    /// Returns `true` if a new buffer was created. An empty scene still gets
    /// a one-record buffer so the kernel always has something bound.
    pub fn ensure_scene_buffer<R: GpuRecord>(
        &mut self,
        backend: &mut B,
        count: usize,
        record_stride: u64,
    ) -> Result<bool> {
        R::check_stride(record_stride).map_err(|_| RenderError::StrideMismatch {
            record: R::NAME,
            expected: R::STRIDE,
            actual: record_stride,
        })?;

        if let Some(existing) = &self.scene {
            if existing.count == count && existing.stride == record_stride {
                return Ok(false);
            }
        }

        if let Some(old) = self.scene.take() {
            backend.release_buffer(old.buffer)?;
        }
        let size = R::buffer_size(count.max(1));
        let buffer = backend.create_buffer(size)?;
        self.scene = Some(SceneBuffer {
            buffer,
            count,
            stride: record_stride,
            written: 0,
        });
        self.reallocations += 1;
        debug!("Scene buffer sized for {count} {} records ({size} bytes)", R::NAME);
        Ok(true)
    }

    /// [`ensure_scene_buffer`](Self::ensure_scene_buffer) with `R`'s own stride.
    pub fn ensure_scene_buffer_for<R: GpuRecord>(&mut self, backend: &mut B, count: usize) -> Result<bool> {
        self.ensure_scene_buffer::<R>(backend, count, R::STRIDE)
    }

    /// Write `records` into the scene buffer, resizing it first if needed.
    pub fn upload_scene<R: GpuRecord>(&mut self, backend: &mut B, records: &[R]) -> Result<()> {
        let written = record_count(records.len())?;
        self.ensure_scene_buffer_for::<R>(backend, records.len())?;
        let Some(scene) = self.scene.as_mut() else {
            return Err(RenderError::Backend("scene buffer missing after allocation".to_string()));
        };
        if !records.is_empty() {
            backend.write_buffer(&mut scene.buffer, bytemuck::cast_slice(records))?;
        }
        scene.written = written;
        Ok(())
    }

    /// Make sure both targets are `width`×`height`.
    ///
    /// Returns `true` if the targets were (re)created, which invalidates any
    /// accumulated image.
    pub fn ensure_render_targets(&mut self, backend: &mut B, width: u32, height: u32) -> Result<bool> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyResolution { width, height });
        }
        if self.target_size() == Some((width, height)) {
            return Ok(false);
        }

        if let Some(old) = self.targets.take() {
            debug!(
                "Render targets {}x{} -> {width}x{height}",
                old.width, old.height
            );
            old.release_with(backend)?;
        }

        let raw = backend.create_target(TargetRole::Raw, width, height)?;
        let accumulated = match backend.create_target(TargetRole::Accumulated, width, height) {
            Ok(target) => target,
            Err(err) => {
                backend.release_target(raw)?;
                return Err(err);
            }
        };
        self.targets = Some(RenderTargets {
            raw,
            accumulated,
            width,
            height,
        });
        self.reallocations += 1;
        Ok(true)
    }

    pub fn scene_buffer(&self) -> Option<&B::Buffer> {
        self.scene.as_ref().map(|s| &s.buffer)
    }

    /// Spheres written by the last upload.
    pub fn sphere_count(&self) -> u32 {
        self.scene.as_ref().map_or(0, |s| s.written)
    }

    pub fn targets(&self) -> Option<&RenderTargets<B::Target>> {
        self.targets.as_ref()
    }

    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(|t| (t.width, t.height))
    }

    /// Buffers and target pairs created so far.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.scene.is_none() && self.targets.is_none()
    }

    /// Release the scene buffer and both targets.
    ///
    /// Safe to call more than once. Everything is attempted; the first
    /// failure is returned.
    pub fn release(&mut self, backend: &mut B) -> Result<()> {
        let scene = self
            .scene
            .take()
            .map_or(Ok(()), |scene| backend.release_buffer(scene.buffer));
        let targets = self
            .targets
            .take()
            .map_or(Ok(()), |targets| targets.release_with(backend));
        scene.and(targets)
    }
}

impl<B: RenderBackend> Drop for GpuResources<B> {
    fn drop(&mut self) {
        if !self.is_empty() {
            warn!("GpuResources dropped without release(); GPU objects leaked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockEvent};
    use lumenray_core::{MinimalSphereRecord, SphereRecord};

    fn setup() -> (MockBackend, GpuResources<MockBackend>) {
        (MockBackend::new(), GpuResources::new())
    }

    #[test]
    fn targets_are_idempotent() {
        let (mut backend, mut resources) = setup();
        assert!(resources.ensure_render_targets(&mut backend, 64, 32).unwrap());
        assert!(!resources.ensure_render_targets(&mut backend, 64, 32).unwrap());
        assert!(!resources.ensure_render_targets(&mut backend, 64, 32).unwrap());
        assert_eq!(backend.targets_created(), 2);
        assert_eq!(backend.targets_released(), 0);
        resources.release(&mut backend).unwrap();
    }

    #[test]
    fn resize_releases_before_creating() {
        let (mut backend, mut resources) = setup();
        resources.ensure_render_targets(&mut backend, 64, 32).unwrap();
        backend.clear_events();

        assert!(resources.ensure_render_targets(&mut backend, 128, 64).unwrap());
        let events = backend.events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], MockEvent::ReleaseTarget { .. }));
        assert!(matches!(events[1], MockEvent::ReleaseTarget { .. }));
        assert!(matches!(
            events[2],
            MockEvent::CreateTarget { width: 128, height: 64, .. }
        ));
        assert!(matches!(
            events[3],
            MockEvent::CreateTarget { width: 128, height: 64, .. }
        ));
        assert_eq!(resources.target_size(), Some((128, 64)));
        resources.release(&mut backend).unwrap();
    }

    #[test]
    fn zero_size_targets_rejected() {
        let (mut backend, mut resources) = setup();
        assert!(matches!(
            resources.ensure_render_targets(&mut backend, 0, 10),
            Err(RenderError::EmptyResolution { width: 0, height: 10 })
        ));
        assert_eq!(backend.targets_created(), 0);
    }

    #[test]
    fn stride_mismatch_allocates_nothing() {
        let (mut backend, mut resources) = setup();
        let err = resources
            .ensure_scene_buffer::<SphereRecord>(&mut backend, 4, 40)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::StrideMismatch {
                record: "sphere",
                expected: 80,
                actual: 40
            }
        ));
        assert_eq!(backend.buffers_created(), 0);
        assert!(resources.scene_buffer().is_none());
    }

    #[test]
    fn scene_buffer_follows_count_and_layout() {
        let (mut backend, mut resources) = setup();
        assert!(resources.ensure_scene_buffer_for::<SphereRecord>(&mut backend, 3).unwrap());
        assert!(!resources.ensure_scene_buffer_for::<SphereRecord>(&mut backend, 3).unwrap());
        assert!(resources.ensure_scene_buffer_for::<SphereRecord>(&mut backend, 5).unwrap());
        assert!(resources
            .ensure_scene_buffer_for::<MinimalSphereRecord>(&mut backend, 5)
            .unwrap());

        let sizes: Vec<u64> = backend
            .events()
            .iter()
            .filter_map(|e| match e {
                MockEvent::CreateBuffer { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![240, 400, 200]);
        assert_eq!(backend.buffers_released(), 2);
        resources.release(&mut backend).unwrap();
    }

    #[test]
    fn upload_writes_records_in_order() {
        let (mut backend, mut resources) = setup();
        let records: Vec<SphereRecord> = (0..3)
            .map(|i| SphereRecord {
                radius: i as f32 + 1.0,
                ..SphereRecord::default()
            })
            .collect();
        resources.upload_scene(&mut backend, &records).unwrap();
        assert_eq!(resources.sphere_count(), 3);

        let bytes = backend.buffer_bytes(resources.scene_buffer().unwrap()).unwrap();
        let uploaded: &[SphereRecord] = bytemuck::cast_slice(bytes);
        assert_eq!(uploaded, records.as_slice());
        resources.release(&mut backend).unwrap();
    }

    #[test]
    fn empty_scene_still_binds_a_buffer() {
        let (mut backend, mut resources) = setup();
        resources.upload_scene::<SphereRecord>(&mut backend, &[]).unwrap();
        assert_eq!(resources.sphere_count(), 0);
        assert!(matches!(
            backend.events(),
            [MockEvent::CreateBuffer { size: 80, .. }]
        ));
        resources.release(&mut backend).unwrap();
    }

    #[test]
    fn release_frees_everything_once() {
        let (mut backend, mut resources) = setup();
        resources.upload_scene(&mut backend, &[SphereRecord::default()]).unwrap();
        resources.ensure_render_targets(&mut backend, 8, 8).unwrap();
        assert_eq!(backend.live_resources(), 3);

        resources.release(&mut backend).unwrap();
        resources.release(&mut backend).unwrap();
        assert_eq!(backend.live_resources(), 0);
        assert_eq!(backend.targets_released(), 2);
        assert_eq!(backend.buffers_released(), 1);
        assert!(resources.is_empty());
    }

    #[test]
    fn failed_release_still_frees_the_rest() {
        let (mut backend, mut resources) = setup();
        resources.upload_scene(&mut backend, &[SphereRecord::default()]).unwrap();
        resources.ensure_render_targets(&mut backend, 8, 8).unwrap();
        let raw = resources.targets().unwrap().raw.id();
        backend.fail_release_of(raw);

        assert!(matches!(resources.release(&mut backend), Err(RenderError::Backend(_))));
        assert_eq!(backend.targets_released(), 1);
        assert_eq!(backend.buffers_released(), 1);
        assert_eq!(backend.live_resources(), 1);
        assert!(resources.is_empty());
    }

    #[test]
    fn failed_release_on_resize_frees_accumulated() {
        let (mut backend, mut resources) = setup();
        resources.ensure_render_targets(&mut backend, 8, 8).unwrap();
        let raw = resources.targets().unwrap().raw.id();
        backend.fail_release_of(raw);
        backend.clear_events();

        assert!(resources.ensure_render_targets(&mut backend, 16, 16).is_err());
        assert_eq!(backend.events().len(), 1);
        assert!(matches!(backend.events()[0], MockEvent::ReleaseTarget { .. }));
        assert_eq!(backend.targets_created(), 0);
        assert!(resources.targets().is_none());
    }

    #[test]
    fn record_count_must_fit_u32() {
        assert_eq!(record_count(7).unwrap(), 7);
        assert_eq!(record_count(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            record_count(u32::MAX as usize + 1),
            Err(RenderError::TooManyRecords(n)) if n == u32::MAX as usize + 1
        ));
    }

    #[test]
    fn failed_allocation_propagates() {
        let (mut backend, mut resources) = setup();
        backend.fail_allocations(true);
        assert!(matches!(
            resources.ensure_render_targets(&mut backend, 8, 8),
            Err(RenderError::Gpu(lumenray_gpu::GpuError::AllocationFailed(_)))
        ));
        assert!(resources.targets().is_none());
    }
}
