//! Per-frame uniform derivation and change detection.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};
use lumenray_core::Transform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::camera::Camera;
use crate::light::DirectionalLight;
use crate::settings::RenderMode;

/// Values the tracing kernel needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub camera_to_world: Mat4,
    pub inverse_projection: Mat4,
    /// `xyz` = light direction, `w` = intensity.
    pub light: Vec4,
    pub real_time: bool,
    /// Sub-pixel offset in `[0, 1)²`, zero in real-time mode.
    pub pixel_offset: Vec2,
    pub seed: f32,
}

impl FrameUniforms {
    pub fn to_gpu(&self) -> GpuFrameUniforms {
        GpuFrameUniforms {
            camera_to_world: self.camera_to_world.to_cols_array_2d(),
            inverse_projection: self.inverse_projection.to_cols_array_2d(),
            light: self.light.to_array(),
            pixel_offset: self.pixel_offset.to_array(),
            seed: self.seed,
            real_time: u32::from(self.real_time),
        }
    }
}

/// Uniform block bound at binding 0 of `path_trace.comp` (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuFrameUniforms {
    pub camera_to_world: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub light: [f32; 4],
    pub pixel_offset: [f32; 2],
    pub seed: f32,
    pub real_time: u32,
}

impl GpuFrameUniforms {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Output of [`FrameParameterBuilder::build`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub uniforms: FrameUniforms,
    /// Camera, projection, light or scene differ from the previous frame.
    pub moved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Observed {
    camera: Transform,
    projection: Mat4,
    light: DirectionalLight,
    scene_revision: u64,
}

/// Builds [`FrameUniforms`] and tracks what changed since the last frame.
pub struct FrameParameterBuilder {
    rng: StdRng,
    previous: Option<Observed>,
}

impl Default for FrameParameterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParameterBuilder {
    /// Builder drawing seeds and jitter from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Builder with a caller-supplied generator, for reproducible frames.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            previous: None,
        }
    }

    /// Derive this frame's uniforms.
    ///
    /// The camera is only read. The very first call always reports `moved`.
    pub fn build(
        &mut self,
        camera: &Camera,
        light: &DirectionalLight,
        scene_revision: u64,
        mode: RenderMode,
    ) -> FrameParams {
        let observed = Observed {
            camera: *camera.transform(),
            projection: camera.projection_matrix(),
            light: *light,
            scene_revision,
        };
        let moved = self.previous.as_ref() != Some(&observed);
        self.previous = Some(observed);

        let pixel_offset = match mode {
            RenderMode::RealTime => Vec2::ZERO,
            RenderMode::Progressive => Vec2::new(self.rng.random(), self.rng.random()),
        };
        let seed: f32 = self.rng.random();

        if moved {
            trace!("Frame inputs changed (scene revision {scene_revision})");
        }

        FrameParams {
            uniforms: FrameUniforms {
                camera_to_world: camera.camera_to_world(),
                inverse_projection: observed.projection.inverse(),
                light: light.to_vec4(),
                real_time: mode.is_real_time(),
                pixel_offset,
                seed,
            },
            moved,
        }
    }

    /// Forget the previous frame so the next build reports a change.
    pub fn invalidate(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::mem::{offset_of, size_of};

    fn builder() -> FrameParameterBuilder {
        FrameParameterBuilder::with_rng(StdRng::seed_from_u64(7))
    }

    #[test]
    fn uniform_block_layout() {
        assert_eq!(size_of::<GpuFrameUniforms>(), 160);
        assert_eq!(offset_of!(GpuFrameUniforms, camera_to_world), 0);
        assert_eq!(offset_of!(GpuFrameUniforms, inverse_projection), 64);
        assert_eq!(offset_of!(GpuFrameUniforms, light), 128);
        assert_eq!(offset_of!(GpuFrameUniforms, pixel_offset), 144);
        assert_eq!(offset_of!(GpuFrameUniforms, seed), 152);
        assert_eq!(offset_of!(GpuFrameUniforms, real_time), 156);
    }

    #[test]
    fn real_time_has_no_jitter() {
        let mut builder = builder();
        let camera = Camera::default();
        let light = DirectionalLight::default();
        for _ in 0..16 {
            let params = builder.build(&camera, &light, 0, RenderMode::RealTime);
            assert_eq!(params.uniforms.pixel_offset, Vec2::ZERO);
            assert!(params.uniforms.real_time);
        }
    }

    #[test]
    fn progressive_jitter_in_unit_square() {
        let mut builder = builder();
        let camera = Camera::default();
        let light = DirectionalLight::default();
        let mut offsets = Vec::new();
        for _ in 0..64 {
            let params = builder.build(&camera, &light, 0, RenderMode::Progressive);
            let offset = params.uniforms.pixel_offset;
            assert!((0.0..1.0).contains(&offset.x));
            assert!((0.0..1.0).contains(&offset.y));
            assert!(!params.uniforms.real_time);
            offsets.push(offset);
        }
        offsets.dedup();
        assert!(offsets.len() > 1, "jitter should vary between frames");
    }

    #[test]
    fn seed_changes_every_frame() {
        let mut builder = builder();
        let camera = Camera::default();
        let light = DirectionalLight::default();
        let a = builder.build(&camera, &light, 0, RenderMode::RealTime);
        let b = builder.build(&camera, &light, 0, RenderMode::RealTime);
        assert_ne!(a.uniforms.seed, b.uniforms.seed);
        assert!((0.0..1.0).contains(&a.uniforms.seed));
    }

    #[test]
    fn detects_camera_motion() {
        let mut builder = builder();
        let mut camera = Camera::default();
        let light = DirectionalLight::default();

        assert!(builder.build(&camera, &light, 0, RenderMode::Progressive).moved);
        assert!(!builder.build(&camera, &light, 0, RenderMode::Progressive).moved);

        let mut transform = *camera.transform();
        transform.position += Vec3::X * 0.25;
        camera.set_transform(transform);
        assert!(builder.build(&camera, &light, 0, RenderMode::Progressive).moved);
        assert!(!builder.build(&camera, &light, 0, RenderMode::Progressive).moved);
    }

    #[test]
    fn detects_scene_light_and_projection_changes() {
        let mut builder = builder();
        let mut camera = Camera::default();
        let light = DirectionalLight::default();
        builder.build(&camera, &light, 0, RenderMode::Progressive);

        assert!(builder.build(&camera, &light, 1, RenderMode::Progressive).moved);

        let brighter = DirectionalLight::new(light.direction, 2.0);
        assert!(builder.build(&camera, &brighter, 1, RenderMode::Progressive).moved);

        camera.set_viewport(100, 100);
        assert!(builder.build(&camera, &brighter, 1, RenderMode::Progressive).moved);
    }

    #[test]
    fn invalidate_forces_change() {
        let mut builder = builder();
        let camera = Camera::default();
        let light = DirectionalLight::default();
        builder.build(&camera, &light, 0, RenderMode::Progressive);
        builder.invalidate();
        assert!(builder.build(&camera, &light, 0, RenderMode::Progressive).moved);
    }

    #[test]
    fn gpu_form_carries_flag_and_light() {
        let mut builder = builder();
        let light = DirectionalLight::new(Vec3::NEG_Y, 3.0);
        let params = builder.build(&Camera::default(), &light, 0, RenderMode::RealTime);
        let gpu = params.uniforms.to_gpu();
        assert_eq!(gpu.real_time, 1);
        assert_eq!(gpu.light, [0.0, -1.0, 0.0, 3.0]);
        assert_eq!(gpu.pixel_offset, [0.0, 0.0]);
    }
}
