//! Scene error types.

use hecs::Entity;
use thiserror::Error;

/// Scene-related errors.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Scene file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scene file is not valid TOML or does not match the schema.
    #[error("Scene parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The entity is not a registered sphere.
    #[error("Entity {0:?} is not part of the scene")]
    UnknownEntity(Entity),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SceneError>;
