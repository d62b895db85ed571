//! Material resolution for scene records.

use lumenray_core::SphereRecord;

use crate::components::RtMaterial;

/// Material of a renderable sphere.
///
/// Spheres without an [`RtMaterial`] component resolve to [`Material::Default`],
/// so every sphere always yields a complete record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Material {
    /// Warm, mostly transparent glass with a faint glow.
    #[default]
    Default,
    /// Explicit material annotation.
    Custom(RtMaterial),
}

impl Material {
    /// Values applied to spheres without a material annotation.
    pub const DEFAULT_VALUES: RtMaterial = RtMaterial {
        smoothness: 1_000_000.0,
        opacity: 0.25,
        refractive_smoothness: 100_000.0,
        refraction_index: 1.5,
        albedo: [1.0, 0.78, 0.34],
        specular: [1.0, 0.78, 0.34],
        refraction_tint: [0.30, 0.30, 0.90],
        emission: [0.01, 0.01, 0.01],
    };

    /// Build from an optional annotation.
    pub fn from_annotation(annotation: Option<RtMaterial>) -> Self {
        annotation.map_or(Self::Default, Self::Custom)
    }

    /// Concrete material values.
    pub const fn resolve(&self) -> RtMaterial {
        match self {
            Self::Default => Self::DEFAULT_VALUES,
            Self::Custom(material) => *material,
        }
    }

    /// Write the material fields into a record, leaving geometry untouched.
    pub fn apply(&self, record: &mut SphereRecord) {
        let m = self.resolve();
        record.smoothness = m.smoothness;
        record.opacity = m.opacity;
        record.refractive_smoothness = m.refractive_smoothness;
        record.refraction_index = m.refraction_index;
        record.albedo = m.albedo;
        record.specular = m.specular;
        record.refraction_tint = m.refraction_tint;
        record.emission = m.emission;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_annotation_is_default() {
        assert_eq!(Material::from_annotation(None), Material::Default);
    }

    #[test]
    fn custom_material_resolves_to_itself() {
        let custom = RtMaterial {
            smoothness: 3.0,
            emission: [1.0, 0.0, 0.0],
            ..RtMaterial::default()
        };
        assert_eq!(Material::from_annotation(Some(custom)).resolve(), custom);
    }

    #[test]
    fn apply_keeps_geometry() {
        let mut record = SphereRecord {
            radius: 4.0,
            position: [1.0, 2.0, 3.0],
            ..SphereRecord::default()
        };
        Material::Default.apply(&mut record);
        assert_eq!(record.radius, 4.0);
        assert_eq!(record.position, [1.0, 2.0, 3.0]);
        assert_eq!(record.opacity, 0.25);
        assert_eq!(record.refraction_index, 1.5);
    }
}
