//! Pinhole camera.

use glam::{Mat4, Vec3};
use lumenray_core::Transform;

/// Perspective camera placed by a world transform.
///
/// The tracing kernel turns pixel coordinates into rays with the inverse
/// projection and then moves them into world space with
/// [`Camera::camera_to_world`].
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    transform: Transform,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Transform::from_position(Vec3::new(0.0, 1.0, 6.0)),
            fov_y: 60f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.3,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            ..Default::default()
        }
    }

    /// Camera at `position` looking at `target` with `+Y` up.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self::new(Transform::looking_at(position, target, Vec3::Y))
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position
    }

    /// Match the aspect ratio to an output size.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Rigid camera-to-world matrix (scale is ignored).
    pub fn camera_to_world(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.transform.rotation, self.transform.position)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn inverse_projection(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }
}
