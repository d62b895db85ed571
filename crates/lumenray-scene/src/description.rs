//! TOML scene description files.
//!
//! ```toml
//! [light]
//! direction = [-0.3, -1.0, 0.4]
//! intensity = 1.0
//!
//! [[spheres]]
//! name = "glass"
//! position = [0.0, 1.0, 0.0]
//! radius = 1.0
//!
//! [spheres.material]
//! opacity = 0.1
//! refraction_index = 1.5
//! ```

use std::path::Path;

use glam::Vec3;
use lumenray_core::Transform;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::{RtMaterial, SphereCollider};
use crate::error::Result;
use crate::scene::Scene;

/// Directional light entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescription {
    /// Direction the light travels in (need not be normalized).
    pub direction: [f32; 3],
    pub intensity: f32,
}

/// One sphere entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereDescription {
    #[serde(default)]
    pub name: String,
    pub position: [f32; 3],
    /// Base radius; omitting it produces a sphere without bounds.
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default)]
    pub material: Option<RtMaterial>,
}

const fn unit_scale() -> f32 {
    1.0
}

/// Parsed scene file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub light: Option<LightDescription>,
    #[serde(default)]
    pub spheres: Vec<SphereDescription>,
}

impl SceneDescription {
    /// Parse a description from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a description from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let description = Self::from_toml_str(&text)?;
        info!(
            "Loaded scene {} ({} spheres)",
            path.display(),
            description.spheres.len()
        );
        Ok(description)
    }

    /// Instantiate the spheres into a fresh [`Scene`].
    pub fn to_scene(&self) -> Scene {
        let mut scene = Scene::new();
        for (i, sphere) in self.spheres.iter().enumerate() {
            let name = if sphere.name.is_empty() {
                format!("sphere_{i}")
            } else {
                sphere.name.clone()
            };
            let transform =
                Transform::from_position(Vec3::from_array(sphere.position)).with_uniform_scale(sphere.scale);
            let collider = sphere.radius.map(|radius| SphereCollider { radius });
            scene.spawn_sphere(name, transform, collider, sphere.material);
        }
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::snapshot::build_snapshot;

    const SAMPLE: &str = r#"
[light]
direction = [0.0, -1.0, 0.0]
intensity = 2.0

[[spheres]]
name = "glass"
position = [0.0, 1.0, 0.0]
radius = 1.0
scale = 2.0

[spheres.material]
opacity = 0.1
refraction_index = 1.5
albedo = [0.9, 0.9, 0.9]

[[spheres]]
position = [3.0, 0.5, 0.0]
radius = 0.5

[[spheres]]
name = "marker"
position = [0.0, 0.0, 0.0]
"#;

    #[test]
    fn parses_sample() {
        let desc = SceneDescription::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            desc.light,
            Some(LightDescription {
                direction: [0.0, -1.0, 0.0],
                intensity: 2.0
            })
        );
        assert_eq!(desc.spheres.len(), 3);
        assert_eq!(desc.spheres[0].scale, 2.0);
        assert_eq!(desc.spheres[1].scale, 1.0);
        assert_eq!(desc.spheres[2].radius, None);

        let material = desc.spheres[0].material.unwrap();
        assert_eq!(material.opacity, 0.1);
        // Unset fields come from RtMaterial::default.
        assert_eq!(material.emission, [0.0; 3]);
    }

    #[test]
    fn instantiates_scene() {
        let scene = SceneDescription::from_toml_str(SAMPLE).unwrap().to_scene();
        let spheres = scene.renderable_spheres();
        assert_eq!(spheres.len(), 3);
        assert_eq!(spheres[0].name, "glass");
        assert_eq!(spheres[1].name, "sphere_1");
        assert_eq!(spheres[1].material, Material::Default);
        assert_eq!(spheres[0].radius(), Some(2.0));

        let snapshot = build_snapshot(&scene);
        assert_eq!(snapshot.misconfigured, 1);
    }

    #[test]
    fn rejects_malformed_file() {
        let err = SceneDescription::from_toml_str("[[spheres]]\nposition = 3").unwrap_err();
        assert!(matches!(err, crate::SceneError::Parse(_)));
    }

    #[test]
    fn empty_file_is_empty_scene() {
        let desc = SceneDescription::from_toml_str("").unwrap();
        assert!(desc.to_scene().is_empty());
        assert!(desc.light.is_none());
    }
}
