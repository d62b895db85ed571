//! Components attached to scene entities.

use serde::{Deserialize, Serialize};

/// Marker for entities the path tracer enumerates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renderable;

/// Display name, used when reporting configuration errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name(pub String);

/// Spherical bounds descriptor.
///
/// The effective radius is `radius * transform.scale.x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCollider {
    pub radius: f32,
}

impl Default for SphereCollider {
    fn default() -> Self {
        Self { radius: 0.5 }
    }
}

/// Ray tracing material annotation.
///
/// Colors are normalized RGB triples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtMaterial {
    pub smoothness: f32,
    pub opacity: f32,
    pub refractive_smoothness: f32,
    pub refraction_index: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub refraction_tint: [f32; 3],
    pub emission: [f32; 3],
}

impl Default for RtMaterial {
    /// A fully opaque black sphere; unset fields in scene files start here.
    fn default() -> Self {
        Self {
            smoothness: 0.0,
            opacity: 1.0,
            refractive_smoothness: 0.0,
            refraction_index: 1.0,
            albedo: [0.0; 3],
            specular: [0.0; 3],
            refraction_tint: [0.0; 3],
            emission: [0.0; 3],
        }
    }
}
