//! Sphere scene registry for the Lumenray path tracer.
//!
//! Uses hecs as the storage backend. Renderable spheres are registered in
//! insertion order so that every snapshot enumerates them identically.
//!
//! - [`Scene`]: the registry and its typed query
//! - [`build_snapshot`]: serializes the scene into [`SphereRecord`]s
//! - [`SceneDescription`]: TOML scene files
//!
//! [`SphereRecord`]: lumenray_core::SphereRecord

pub mod components;
pub mod description;
pub mod error;
pub mod material;
pub mod scene;
pub mod snapshot;

pub use components::{Name, Renderable, RtMaterial, SphereCollider};
pub use description::{LightDescription, SceneDescription, SphereDescription};
pub use error::{Result, SceneError};
pub use hecs::Entity;
pub use lumenray_core::Transform;
pub use material::Material;
pub use scene::{Scene, SphereView};
pub use snapshot::{build_snapshot, SceneSnapshot};
