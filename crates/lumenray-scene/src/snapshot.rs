//! Scene serialization into GPU sphere records.

use lumenray_core::SphereRecord;
use tracing::{error, trace};

use crate::scene::{Scene, SphereView};

/// Records for one serialization of the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSnapshot {
    /// One record per renderable sphere, in scene insertion order.
    pub records: Vec<SphereRecord>,
    /// Number of spheres emitted as zeroed placeholders.
    pub misconfigured: usize,
}

impl SceneSnapshot {
    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Serialize every renderable sphere into a [`SphereRecord`].
///
/// A sphere without a [`SphereCollider`](crate::SphereCollider) is a
/// configuration error: it is logged and replaced by a zeroed record so the
/// frame still renders and indices stay aligned with the scene.
pub fn build_snapshot(scene: &Scene) -> SceneSnapshot {
    let spheres = scene.renderable_spheres();
    let mut snapshot = SceneSnapshot {
        records: Vec::with_capacity(spheres.len()),
        misconfigured: 0,
    };

    for sphere in &spheres {
        match to_record(sphere) {
            Some(record) => snapshot.records.push(record),
            None => {
                error!(
                    "object '{}' has no sphere collider and is probably not a sphere object",
                    sphere.name
                );
                snapshot.records.push(SphereRecord::default());
                snapshot.misconfigured += 1;
            }
        }
    }

    trace!(
        spheres = snapshot.records.len(),
        misconfigured = snapshot.misconfigured,
        "scene serialized"
    );
    snapshot
}

fn to_record(sphere: &SphereView) -> Option<SphereRecord> {
    let radius = sphere.radius()?;
    let mut record = SphereRecord {
        radius,
        position: sphere.transform.position.to_array(),
        ..SphereRecord::default()
    };
    sphere.material.apply(&mut record);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{RtMaterial, SphereCollider};
    use crate::material::Material;
    use glam::Vec3;
    use lumenray_core::Transform;

    #[test]
    fn default_material_values_are_exact() {
        let mut scene = Scene::new();
        scene.spawn_sphere(
            "plain",
            Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
            Some(SphereCollider { radius: 0.5 }),
            None,
        );

        let snapshot = build_snapshot(&scene);
        let r = snapshot.records[0];
        assert_eq!(r.radius, 0.5);
        assert_eq!(r.position, [1.0, 2.0, 3.0]);
        assert_eq!(r.smoothness, 1_000_000.0);
        assert_eq!(r.opacity, 0.25);
        assert_eq!(r.refractive_smoothness, 100_000.0);
        assert_eq!(r.refraction_index, 1.5);
        assert_eq!(r.albedo, [1.0, 0.78, 0.34]);
        assert_eq!(r.specular, [1.0, 0.78, 0.34]);
        assert_eq!(r.refraction_tint, [0.30, 0.30, 0.90]);
        assert_eq!(r.emission, [0.01, 0.01, 0.01]);
        assert_eq!(snapshot.misconfigured, 0);
    }

    #[test]
    fn custom_material_is_copied() {
        let material = RtMaterial {
            smoothness: 12.0,
            opacity: 1.0,
            refractive_smoothness: 3.0,
            refraction_index: 1.33,
            albedo: [0.2, 0.4, 0.6],
            specular: [0.04, 0.04, 0.04],
            refraction_tint: [1.0, 1.0, 1.0],
            emission: [5.0, 4.0, 3.0],
        };
        let mut scene = Scene::new();
        scene.spawn_sphere(
            "lamp",
            Transform::default().with_uniform_scale(2.0),
            Some(SphereCollider { radius: 1.5 }),
            Some(material),
        );

        let r = build_snapshot(&scene).records[0];
        assert_eq!(r.radius, 3.0);
        assert_eq!(r.smoothness, 12.0);
        assert_eq!(r.refraction_index, 1.33);
        assert_eq!(r.albedo, [0.2, 0.4, 0.6]);
        assert_eq!(r.emission, [5.0, 4.0, 3.0]);
    }

    #[test]
    fn missing_collider_emits_zeroed_placeholder() {
        let mut scene = Scene::new();
        scene.spawn_sphere("ok", Transform::default(), Some(SphereCollider::default()), None);
        scene.spawn_sphere("broken", Transform::from_position(Vec3::ONE), None, None);
        scene.spawn_sphere("ok2", Transform::default(), Some(SphereCollider::default()), None);

        let snapshot = build_snapshot(&scene);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.misconfigured, 1);
        assert_eq!(snapshot.records[1], SphereRecord::default());
        assert_eq!(snapshot.records[2].radius, 0.5);
    }

    #[test]
    fn order_follows_insertion() {
        let mut scene = Scene::new();
        for i in 0..5 {
            let material = (i % 2 == 0).then(RtMaterial::default);
            scene.spawn_sphere(
                format!("s{i}"),
                Transform::from_position(Vec3::new(i as f32, 0.0, 0.0)),
                Some(SphereCollider::default()),
                material,
            );
        }

        let xs: Vec<f32> = build_snapshot(&scene)
            .records
            .iter()
            .map(|r| r.position[0])
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn empty_scene_yields_empty_snapshot() {
        let snapshot = build_snapshot(&Scene::new());
        assert!(snapshot.is_empty());
        assert_eq!(Material::default(), Material::Default);
    }
}
