//! Per-frame orchestration of the path tracer.

use lumenray_scene::{build_snapshot, Scene};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::accumulate::{CompositePass, Compositor, CompositorState};
use crate::backend::{Readback, RenderBackend, TargetRole};
use crate::camera::Camera;
use crate::dispatch::{DispatchController, ThreadGroups};
use crate::error::{RenderError, Result};
use crate::frame_params::FrameParameterBuilder;
use crate::light::DirectionalLight;
use crate::resources::GpuResources;
use crate::settings::{RenderMode, RenderSettings};
use crate::sky::SkyImage;

/// Counters kept across the renderer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderStats {
    pub frames: u64,
    pub dispatches: u64,
    /// Samples in the current still episode.
    pub samples: u32,
    /// Scene buffers and target pairs created.
    pub reallocations: u64,
    /// Scene serializations.
    pub uploads: u64,
    /// Seconds of frame time passed to `render`.
    pub elapsed: f32,
}

impl RenderStats {
    pub fn average_fps(&self) -> f32 {
        if self.elapsed > 0.0 {
            self.frames as f32 / self.elapsed
        } else {
            0.0
        }
    }
}

/// What [`PathTracer::render`] did this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub pass: CompositePass,
    /// `None` when the frame reused the converged image.
    pub groups: Option<ThreadGroups>,
    /// Camera, light, scene or resolution changed since the previous frame.
    pub moved: bool,
    pub samples: u32,
}

/// Progressive sphere path tracer over a [`RenderBackend`].
///
/// Owns the render targets and scene buffer. Call [`PathTracer::shutdown`]
/// before dropping it; dropping alone releases nothing on the device.
pub struct PathTracer<B: RenderBackend> {
    backend: B,
    resources: GpuResources<B>,
    params: FrameParameterBuilder,
    dispatcher: DispatchController,
    compositor: Compositor,
    settings: RenderSettings,
    light: DirectionalLight,
    /// Target shown by the last rendered frame.
    shown: Option<TargetRole>,
    stats: RenderStats,
    shut_down: bool,
}

impl<B: RenderBackend> PathTracer<B> {
    /// Take ownership of `backend` and upload the sky.
    pub fn new(mut backend: B, settings: RenderSettings, sky: &SkyImage) -> Result<Self> {
        backend.upload_sky(sky)?;
        info!(
            "Path tracer ready: {:?} mode, sample cap {:?}",
            settings.mode,
            settings.sample_limit()
        );
        Ok(Self {
            backend,
            resources: GpuResources::new(),
            params: FrameParameterBuilder::new(),
            dispatcher: DispatchController::new(),
            compositor: Compositor::new(settings.mode).with_max_samples(settings.max_samples),
            settings,
            light: DirectionalLight::default(),
            shown: None,
            stats: RenderStats::default(),
            shut_down: false,
        })
    }

    /// Draw jitter and seeds from `rng` instead of OS entropy.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.params = FrameParameterBuilder::with_rng(rng);
        self
    }

    #[must_use]
    pub fn with_light(mut self, light: DirectionalLight) -> Self {
        self.light = light;
        self
    }

    pub fn mode(&self) -> RenderMode {
        self.settings.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        if mode != self.settings.mode {
            debug!("Render mode {:?} -> {mode:?}", self.settings.mode);
            self.settings.mode = mode;
        }
    }

    /// Flip between real-time and progressive; returns the new mode.
    pub fn toggle_mode(&mut self) -> RenderMode {
        self.set_mode(self.settings.mode.toggled());
        self.settings.mode
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn set_max_samples(&mut self, max_samples: u32) {
        self.settings.max_samples = max_samples;
        self.compositor.set_max_samples(max_samples);
    }

    pub fn light(&self) -> &DirectionalLight {
        &self.light
    }

    pub fn set_light(&mut self, light: DirectionalLight) {
        self.light = light;
    }

    /// Samples accumulated in the current still episode.
    pub fn samples(&self) -> u32 {
        self.compositor.samples()
    }

    pub fn is_converged(&self) -> bool {
        !self.settings.mode.is_real_time() && self.compositor.is_converged()
    }

    /// Record a copy of the image the last [`PathTracer::render`] presented
    /// into `frame`. Collect it with [`PathTracer::take_capture`] once `frame`
    /// has been submitted.
    pub fn capture_presented(&mut self, frame: &mut B::Frame) -> Result<()> {
        let role = self
            .shown
            .ok_or_else(|| RenderError::Backend("no frame has been presented yet".to_string()))?;
        let targets = self
            .resources
            .targets()
            .ok_or_else(|| RenderError::Backend("render targets missing".to_string()))?;
        let source = match role {
            TargetRole::Raw => &targets.raw,
            TargetRole::Accumulated => &targets.accumulated,
        };
        self.backend.record_readback(frame, source)
    }

    /// Pixels recorded by [`PathTracer::capture_presented`], once the frame
    /// that recorded the copy has completed.
    pub fn take_capture(&mut self) -> Result<Option<Readback>> {
        self.backend.take_readback()
    }

    pub fn stats(&self) -> RenderStats {
        RenderStats {
            samples: self.compositor.samples(),
            reallocations: self.resources.reallocations(),
            dispatches: self.dispatcher.dispatches(),
            ..self.stats
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn resources(&self) -> &GpuResources<B> {
        &self.resources
    }

    /// Record one displayed frame into `frame`.
    ///
    /// `camera` and `scene` are only read. Real-time mode serializes the scene
    /// every frame; progressive mode serializes it when a still episode starts.
    pub fn render(&mut self, frame: &mut B::Frame, scene: &Scene, camera: &Camera, dt: f32) -> Result<FrameReport> {
        if self.shut_down {
            return Err(RenderError::ShutDown);
        }

        let (width, height) = self.backend.frame_extent(frame);
        let mode = self.settings.mode;
        let params = self.params.build(camera, &self.light, scene.revision(), mode);
        let resized = self
            .resources
            .ensure_render_targets(&mut self.backend, width, height)?;
        let moved = params.moved || resized;

        let pass = self.compositor.plan(mode, moved);
        let episode_start = self.compositor.state() == CompositorState::ProgressiveFirstFrame;
        if mode.is_real_time() || episode_start || self.resources.scene_buffer().is_none() {
            let snapshot = build_snapshot(scene);
            if snapshot.misconfigured > 0 && episode_start {
                warn!("{} spheres rendered as placeholders", snapshot.misconfigured);
            }
            self.resources.upload_scene(&mut self.backend, &snapshot.records)?;
            self.stats.uploads += 1;
        }

        let uniforms = params.uniforms.to_gpu();
        let groups = match pass {
            CompositePass::Hold => None,
            CompositePass::Direct | CompositePass::Blend { .. } => Some(self.dispatcher.dispatch(
                &mut self.backend,
                frame,
                &self.resources,
                &uniforms,
                width,
                height,
            )?),
        };

        let targets = self
            .resources
            .targets()
            .ok_or_else(|| RenderError::Backend("render targets missing".to_string()))?;
        let (shown, role) = match pass {
            CompositePass::Direct => (&targets.raw, TargetRole::Raw),
            CompositePass::Blend { weight } => {
                self.backend
                    .blend(frame, &targets.raw, &targets.accumulated, weight)?;
                (&targets.accumulated, TargetRole::Accumulated)
            }
            CompositePass::Hold => (&targets.accumulated, TargetRole::Accumulated),
        };
        self.backend.present(frame, shown)?;
        self.shown = Some(role);

        self.compositor.complete(pass);
        self.stats.frames += 1;
        self.stats.elapsed += dt;

        Ok(FrameReport {
            pass,
            groups,
            moved,
            samples: self.compositor.samples(),
        })
    }

    /// Release targets, the scene buffer and backend objects.
    ///
    /// Later calls do nothing.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.resources.release(&mut self.backend)?;
        self.backend.destroy()?;
        self.shut_down = true;

        let stats = self.stats();
        info!(
            "Path tracer shut down after {} frames ({} dispatches, {} reallocations, {:.1} fps average)",
            stats.frames,
            stats.dispatches,
            stats.reallocations,
            stats.average_fps()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockEvent};
    use approx::assert_relative_eq;
    use glam::Vec3;
    use lumenray_scene::{Entity, SphereCollider};
    use lumenray_core::Transform;
    use rand::SeedableRng;

    fn scene() -> (Scene, Entity) {
        let mut scene = Scene::new();
        let ball = scene.spawn_sphere(
            "ball",
            Transform::from_position(Vec3::ZERO),
            Some(SphereCollider { radius: 1.0 }),
            None,
        );
        scene.spawn_sphere(
            "floor",
            Transform::from_position(Vec3::new(0.0, -101.0, 0.0)).with_uniform_scale(100.0),
            Some(SphereCollider { radius: 1.0 }),
            None,
        );
        (scene, ball)
    }

    /// Each dispatch writes `n + 1` so the running mean is predictable.
    fn tracer(mode: RenderMode) -> PathTracer<MockBackend> {
        let backend = MockBackend::new()
            .with_extent(16, 8)
            .with_sample(|_, n| [(n + 1) as f32; 4]);
        PathTracer::new(
            backend,
            RenderSettings::default().with_mode(mode),
            &SkyImage::gradient(4, 2),
        )
        .unwrap()
        .with_rng(StdRng::seed_from_u64(1))
    }

    fn uploads(tracer: &PathTracer<MockBackend>) -> usize {
        tracer
            .backend()
            .count(|e| matches!(e, MockEvent::WriteBuffer { .. }))
    }

    #[test]
    fn real_time_presents_raw_every_frame() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::RealTime);

        for _ in 0..4 {
            let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
            assert_eq!(report.pass, CompositePass::Direct);
            assert_eq!(report.samples, 0);
        }
        assert_eq!(tracer.backend().dispatches(), 4);
        assert!(tracer.backend().blend_weights().is_empty());
        assert_eq!(uploads(&tracer), 4);
        assert_eq!(tracer.backend().presented().unwrap()[0], [4.0; 4]);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn progressive_converges_to_mean() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);

        for _ in 0..8 {
            tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        }
        let weights = tracer.backend().blend_weights();
        for (k, w) in weights.iter().enumerate() {
            assert_relative_eq!(*w, 1.0 / (k as f32 + 1.0));
        }
        // Mean of 1..=8.
        assert_relative_eq!(tracer.backend().presented().unwrap()[0][0], 4.5, epsilon = 1e-4);
        assert_eq!(tracer.samples(), 8);
        // Serialized once for the whole still episode.
        assert_eq!(uploads(&tracer), 1);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn real_time_dispatch_has_no_jitter() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let backend = MockBackend::new().with_sample(|u, _| [u.pixel_offset[0], u.pixel_offset[1], 0.0, 1.0]);
        let mut tracer = PathTracer::new(backend, RenderSettings::default(), &SkyImage::gradient(4, 2)).unwrap();

        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(matches!(
            tracer.backend().events().iter().rev().find(|e| matches!(e, MockEvent::Dispatch { .. })),
            Some(MockEvent::Dispatch { real_time: true, .. })
        ));
        assert_eq!(tracer.backend().presented().unwrap()[0], [0.0, 0.0, 0.0, 1.0]);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn camera_motion_restarts_accumulation() {
        let (scene, _) = scene();
        let mut camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);

        for _ in 0..3 {
            tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        }
        assert_eq!(tracer.samples(), 3);

        let mut moved = *camera.transform();
        moved.position.x += 0.25;
        camera.set_transform(moved);
        let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(report.moved);
        assert_eq!(report.pass, CompositePass::Blend { weight: 1.0 });
        assert_eq!(report.samples, 1);
        assert_eq!(uploads(&tracer), 2);
        // The fresh episode shows only the newest sample.
        assert_eq!(tracer.backend().presented().unwrap()[0], [4.0; 4]);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn scene_edit_restarts_accumulation() {
        let (mut scene, ball) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);

        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        scene
            .set_transform(ball, Transform::from_position(Vec3::Y))
            .unwrap();
        let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(report.moved);
        assert_eq!(report.samples, 1);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn switching_to_progressive_starts_fresh() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::RealTime);

        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert_eq!(tracer.toggle_mode(), RenderMode::Progressive);

        let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(!report.moved);
        assert_eq!(report.pass, CompositePass::Blend { weight: 1.0 });
        assert_eq!(report.samples, 1);

        tracer.toggle_mode();
        let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert_eq!(report.pass, CompositePass::Direct);
        assert_eq!(report.samples, 0);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn resize_reallocates_and_restarts() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);

        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert_eq!(tracer.backend().targets_created(), 2);

        tracer.backend_mut().set_extent(32, 24);
        let report = tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(report.moved);
        assert_eq!(report.samples, 1);
        assert_eq!(report.groups, Some(ThreadGroups { x: 4, y: 3, z: 1 }));
        assert_eq!(tracer.backend().targets_created(), 4);
        assert_eq!(tracer.backend().targets_released(), 2);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn sample_cap_stops_dispatching() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);
        tracer.set_max_samples(2);

        for _ in 0..5 {
            tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        }
        assert!(tracer.is_converged());
        assert_eq!(tracer.backend().dispatches(), 2);
        assert_eq!(tracer.backend().count(|e| matches!(e, MockEvent::Present { .. })), 5);
        assert_relative_eq!(tracer.backend().presented().unwrap()[0][0], 1.5);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn capture_reads_presented_image() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::Progressive);

        assert!(tracer.capture_presented(&mut ()).is_err());
        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        tracer.capture_presented(&mut ()).unwrap();

        let capture = tracer.take_capture().unwrap().unwrap();
        assert_eq!((capture.width, capture.height), (16, 8));
        assert_relative_eq!(capture.pixels[0][0], 1.5);
        assert!(tracer.take_capture().unwrap().is_none());
        tracer.shutdown().unwrap();
    }

    #[test]
    fn misconfigured_sphere_still_renders() {
        let (mut scene, _) = scene();
        scene.spawn_sphere("broken", Transform::IDENTITY, None, None);
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::RealTime);

        tracer.render(&mut (), &scene, &camera, 0.016).unwrap();
        assert!(tracer.backend().events().iter().any(|e| matches!(
            e,
            MockEvent::Dispatch { sphere_count: 3, .. }
        )));
        tracer.shutdown().unwrap();
    }

    #[test]
    fn zero_extent_is_rejected() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::RealTime);
        tracer.backend_mut().set_extent(0, 0);

        assert!(matches!(
            tracer.render(&mut (), &scene, &camera, 0.016),
            Err(RenderError::EmptyResolution { .. })
        ));
        assert_eq!(tracer.backend().dispatches(), 0);
        tracer.shutdown().unwrap();
    }

    #[test]
    fn shutdown_releases_everything_once() {
        let (scene, _) = scene();
        let camera = Camera::default();
        let mut tracer = tracer(RenderMode::RealTime);
        tracer.render(&mut (), &scene, &camera, 0.5).unwrap();
        tracer.render(&mut (), &scene, &camera, 0.5).unwrap();

        tracer.shutdown().unwrap();
        tracer.shutdown().unwrap();
        assert_eq!(tracer.backend().live_resources(), 0);
        assert_eq!(tracer.backend().count(|e| matches!(e, MockEvent::Destroy)), 1);
        assert_relative_eq!(tracer.stats().average_fps(), 2.0);
        assert!(matches!(
            tracer.render(&mut (), &scene, &camera, 0.016),
            Err(RenderError::ShutDown)
        ));
    }
}
