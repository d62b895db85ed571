//! Scene registry.

use hecs::{Entity, EntityBuilder, World};
use lumenray_core::Transform;

use crate::components::{Name, Renderable, RtMaterial, SphereCollider};
use crate::error::{Result, SceneError};
use crate::material::Material;

/// A resolved, read-only view of one renderable sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereView {
    pub entity: Entity,
    pub name: String,
    pub transform: Transform,
    /// `None` when the entity is misconfigured (no spherical bounds).
    pub collider: Option<SphereCollider>,
    pub material: Material,
}

impl SphereView {
    /// Effective radius: base radius times the uniform scale factor.
    pub fn radius(&self) -> Option<f32> {
        self.collider
            .map(|collider| collider.radius * self.transform.scale.x)
    }
}

/// Registry of renderable spheres backed by a hecs world.
///
/// Every mutation bumps [`Scene::revision`], which the renderer uses to
/// detect scene changes between frames.
pub struct Scene {
    world: World,
    /// Renderable entities in insertion order.
    order: Vec<Entity>,
    revision: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self {
            world: World::new(),
            order: Vec::new(),
            revision: 0,
        }
    }

    /// Spawn a renderable sphere.
    ///
    /// `collider` may be `None` to model an object that was tagged renderable
    /// but lacks spherical bounds; it still occupies a slot in snapshots.
    pub fn spawn_sphere(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        collider: Option<SphereCollider>,
        material: Option<RtMaterial>,
    ) -> Entity {
        let mut builder = EntityBuilder::new();
        builder.add(Renderable).add(Name(name.into())).add(transform);
        if let Some(collider) = collider {
            builder.add(collider);
        }
        if let Some(material) = material {
            builder.add(material);
        }

        let entity = self.world.spawn(builder.build());
        self.order.push(entity);
        self.revision += 1;
        entity
    }

    /// Remove a sphere from the scene.
    pub fn despawn(&mut self, entity: Entity) -> Result<()> {
        self.world
            .despawn(entity)
            .map_err(|_| SceneError::UnknownEntity(entity))?;
        self.order.retain(|&e| e != entity);
        self.revision += 1;
        Ok(())
    }

    /// Replace the world transform of a sphere.
    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> Result<()> {
        let mut current = self
            .world
            .get::<&mut Transform>(entity)
            .map_err(|_| SceneError::UnknownEntity(entity))?;
        if *current != transform {
            *current = transform;
            drop(current);
            self.revision += 1;
        }
        Ok(())
    }

    /// Attach, replace or remove (`None`) the material annotation of a sphere.
    pub fn set_material(&mut self, entity: Entity, material: Option<RtMaterial>) -> Result<()> {
        if !self.world.contains(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }
        match material {
            Some(material) => self
                .world
                .insert_one(entity, material)
                .map_err(|_| SceneError::UnknownEntity(entity))?,
            None => {
                // Removing an absent component is not an error here.
                let _ = self.world.remove_one::<RtMaterial>(entity);
            }
        }
        self.revision += 1;
        Ok(())
    }

    /// Monotonic counter of scene mutations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of renderable spheres.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the scene has no renderable spheres.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// All renderable spheres, in insertion order.
    pub fn renderable_spheres(&self) -> Vec<SphereView> {
        self.order
            .iter()
            .filter(|&&entity| self.world.satisfies::<&Renderable>(entity).unwrap_or(false))
            .map(|&entity| self.view(entity))
            .collect()
    }

    fn view(&self, entity: Entity) -> SphereView {
        let name = self
            .world
            .get::<&Name>(entity)
            .map(|name| name.0.clone())
            .unwrap_or_default();
        let transform = self
            .world
            .get::<&Transform>(entity)
            .map(|t| *t)
            .unwrap_or_default();
        let collider = self.world.get::<&SphereCollider>(entity).ok().map(|c| *c);
        let material = self.world.get::<&RtMaterial>(entity).ok().map(|m| *m);

        SphereView {
            entity,
            name,
            transform,
            collider,
            material: Material::from_annotation(material),
        }
    }
}
