//! Viewer application implementation.

use std::sync::Arc;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use winit::event::ElementState;
use winit::keyboard::{KeyCode, PhysicalKey};

use lumenray_app::{AppContext, Camera, FrameContext, LumenApp, WindowEvent};
use lumenray_render::{
    save_capture, CaptureConfig, DirectionalLight, PathTracer, RenderMode, RenderSettings, ScreenshotError,
    SkyImage, VulkanBackend,
};
use lumenray_scene::{Scene, SceneDescription};

use crate::free_look::FreeLook;

/// Scene used when `--scene` is not given.
const DEMO_SCENE: &str = include_str!("../scenes/demo.toml");

const START_POSITION: Vec3 = Vec3::new(0.0, 2.0, 8.0);
const START_TARGET: Vec3 = Vec3::new(0.0, 0.8, 0.0);

/// Viewer options from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewerParams {
    pub scene: Option<String>,
    pub sky: Option<String>,
    pub progressive: bool,
    pub max_samples: u32,
    /// Fixed seed for jitter and per-frame seeds.
    pub seed: Option<u64>,
}

impl ViewerParams {
    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::parse_args(&args)
    }

    pub fn parse_args(args: &[String]) -> Self {
        let mut params = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--scene" => {
                    if let Some(path) = args.get(i + 1) {
                        params.scene = Some(path.clone());
                        i += 1;
                    }
                }
                "--sky" => {
                    if let Some(path) = args.get(i + 1) {
                        params.sky = Some(path.clone());
                        i += 1;
                    }
                }
                "--progressive" => params.progressive = true,
                "--max-samples" => {
                    if let Some(Ok(n)) = args.get(i + 1).map(|v| v.parse()) {
                        params.max_samples = n;
                        i += 1;
                    }
                }
                "--seed" => {
                    if let Some(Ok(seed)) = args.get(i + 1).map(|v| v.parse()) {
                        params.seed = Some(seed);
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        params
    }

    pub fn settings(&self) -> RenderSettings {
        let mode = if self.progressive {
            RenderMode::Progressive
        } else {
            RenderMode::RealTime
        };
        let settings = RenderSettings::default()
            .with_mode(mode)
            .with_max_samples(self.max_samples);
        match &self.sky {
            Some(path) => settings.with_sky(path.clone()),
            None => settings,
        }
    }

    /// The scene file named by `--scene`, or the built-in demo.
    pub fn scene_description(&self) -> anyhow::Result<SceneDescription> {
        Ok(match &self.scene {
            Some(path) => SceneDescription::load(path)?,
            None => SceneDescription::from_toml_str(DEMO_SCENE)?,
        })
    }
}

/// A capture recorded into a submitted frame, waiting to be read back.
#[derive(Debug, Clone, Copy)]
struct PendingCapture {
    frame: u64,
    samples: u32,
}

pub struct Viewer {
    tracer: PathTracer<VulkanBackend>,
    scene: Scene,
    camera: Camera,
    free_look: FreeLook,
    capture: CaptureConfig,
    pending_capture: Option<PendingCapture>,
    samples_captured: bool,
    toggle_requested: bool,
    should_exit: bool,
}

impl LumenApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let capture = CaptureConfig::from_args();
        if capture.enabled {
            info!(
                "Screenshot capture enabled: frames {:?}, at samples {:?}, output pattern: {}",
                capture.frames, capture.at_samples, capture.output_pattern
            );
        }

        let params = ViewerParams::from_args();
        let settings = params.settings();
        info!("Viewer config: {params:?}");

        let description = params.scene_description()?;
        let light = description
            .light
            .as_ref()
            .map(DirectionalLight::from)
            .unwrap_or_default();
        let scene = description.to_scene();
        info!("Scene has {} spheres", scene.len());

        let sky = SkyImage::load_or_gradient(settings.sky_path.as_deref())?;
        let backend = VulkanBackend::new(Arc::clone(&ctx.gpu))?;
        let mut tracer = PathTracer::new(backend, settings, &sky)?.with_light(light);
        if let Some(seed) = params.seed {
            tracer = tracer.with_rng(StdRng::seed_from_u64(seed));
        }

        let mut camera = Camera::looking_at(START_POSITION, START_TARGET);
        camera.set_viewport(ctx.width(), ctx.height());

        info!("Viewer initialized: R toggles real-time/progressive, WASD/HJKL to move");

        Ok(Self {
            tracer,
            scene,
            camera,
            free_look: FreeLook::new(),
            capture,
            pending_capture: None,
            samples_captured: false,
            toggle_requested: false,
            should_exit: false,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        // The frame that recorded the copy has completed by now.
        if let Some(pending) = self.pending_capture.take() {
            if let Err(e) = self.save_pending(pending) {
                error!("Failed to capture frame {}: {e}", pending.frame);
            }
        }

        if self.capture.exit_after_capture
            && self.capture.all_captured(ctx.frame_count, self.samples_captured)
        {
            info!("All screenshots captured, requesting exit...");
            self.should_exit = true;
        }

        if std::mem::take(&mut self.toggle_requested) {
            let mode = self.tracer.toggle_mode();
            info!("Render mode: {mode:?}");
        }

        let mut transform = *self.camera.transform();
        if self.free_look.update(&mut transform, dt) {
            self.camera.set_transform(transform);
        }
    }

    fn render(&mut self, _ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let mut target = frame.vulkan_frame();
        let report = match self.tracer.render(&mut target, &self.scene, &self.camera, frame.dt) {
            Ok(report) => report,
            Err(e) => {
                error!("Path tracer failed, exiting: {e}");
                self.should_exit = true;
                return Err(e.into());
            }
        };

        if report.samples > 0 && self.tracer.is_converged() && report.groups.is_some() {
            info!("Converged at {} samples", report.samples);
        }

        let capture_samples = !self.tracer.mode().is_real_time() && !self.samples_captured;
        let samples = if capture_samples { report.samples } else { 0 };
        if self.capture.should_capture(frame.frame_number, samples) {
            self.tracer.capture_presented(&mut target)?;
            self.pending_capture = Some(PendingCapture {
                frame: frame.frame_number,
                samples,
            });
        }

        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        // The targets follow the swapchain on the next frame.
        self.camera.set_viewport(width, height);
        Ok(())
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return false;
                };
                let pressed = event.state == ElementState::Pressed;
                if key == KeyCode::KeyR {
                    if pressed && !event.repeat {
                        self.toggle_requested = true;
                    }
                    return true;
                }
                self.free_look.process_key(key, pressed)
            }
            WindowEvent::Focused(false) => {
                self.free_look.release_all();
                false
            }
            _ => false,
        }
    }

    fn should_exit(&self) -> bool {
        self.should_exit
    }

    fn cleanup(&mut self, _ctx: &mut AppContext) {
        if let Some(pending) = self.pending_capture.take() {
            if let Err(e) = self.save_pending(pending) {
                error!("Failed to capture frame {}: {e}", pending.frame);
            }
        }

        let stats = self.tracer.stats();
        info!(
            "Rendered {} frames, {} scene uploads, {} samples in the last still image",
            stats.frames, stats.uploads, stats.samples
        );
        if let Err(e) = self.tracer.shutdown() {
            error!("Failed to shut down path tracer: {e}");
        }
    }
}

impl Viewer {
    fn save_pending(&mut self, pending: PendingCapture) -> anyhow::Result<()> {
        let Some(readback) = self.tracer.take_capture()? else {
            return Err(ScreenshotError::Missing(pending.frame).into());
        };
        save_capture(&readback, self.capture.output_path(pending.frame))?;
        if pending.samples > 0 && self.capture.at_samples == Some(pending.samples) {
            info!("Captured still image at {} samples", pending.samples);
            self.samples_captured = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("lumenray-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_to_real_time_demo() {
        let params = ViewerParams::parse_args(&args(&[]));
        assert_eq!(params, ViewerParams::default());
        let settings = params.settings();
        assert_eq!(settings.mode, RenderMode::RealTime);
        assert_eq!(settings.sample_limit(), None);
        assert!(settings.sky_path.is_none());
    }

    #[test]
    fn parses_all_options() {
        let params = ViewerParams::parse_args(&args(&[
            "--scene",
            "room.toml",
            "--sky",
            "sky.hdr",
            "--progressive",
            "--max-samples",
            "256",
            "--seed",
            "7",
            "-S",
        ]));
        assert_eq!(params.scene.as_deref(), Some("room.toml"));
        assert_eq!(params.seed, Some(7));
        let settings = params.settings();
        assert_eq!(settings.mode, RenderMode::Progressive);
        assert_eq!(settings.sample_limit(), Some(256));
        assert_eq!(settings.sky_path.as_deref(), Some("sky.hdr"));
    }

    #[test]
    fn bad_numbers_are_ignored() {
        let params = ViewerParams::parse_args(&args(&["--max-samples", "lots", "--seed"]));
        assert_eq!(params.max_samples, 0);
        assert_eq!(params.seed, None);
    }

    #[test]
    fn demo_scene_parses() {
        let description = ViewerParams::default().scene_description().unwrap();
        assert!(description.light.is_some());
        let scene = description.to_scene();
        assert_eq!(scene.len(), 7);
        let snapshot = lumenray_scene::build_snapshot(&scene);
        assert_eq!(snapshot.misconfigured, 0);
    }
}
