//! Directional light.

use glam::{Vec3, Vec4};
use lumenray_scene::LightDescription;

/// A sun-like light at infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in, normalized.
    pub direction: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.3, -1.0, 0.4), 1.0)
    }
}

impl DirectionalLight {
    /// Create a light; a zero direction falls back to straight down.
    pub fn new(direction: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.try_normalize().unwrap_or(Vec3::NEG_Y),
            intensity,
        }
    }

    /// Kernel form: `xyz` = direction, `w` = intensity.
    pub fn to_vec4(&self) -> Vec4 {
        self.direction.extend(self.intensity)
    }
}

impl From<&LightDescription> for DirectionalLight {
    fn from(desc: &LightDescription) -> Self {
        Self::new(Vec3::from_array(desc.direction), desc.intensity)
    }
}
