//! Core types and GPU record layouts for the Lumenray path tracer.
//!
//! This crate provides the foundational types shared between the scene,
//! the renderer and the compute kernels:
//! - Fixed-layout scene records consumed by the tracing kernel
//! - World transforms
//! - Common error types

pub mod error;
pub mod layout;
pub mod math;

pub use error::{Error, Result};
pub use layout::{GpuRecord, MinimalSphereRecord, SphereRecord};
pub use math::Transform;

/// Engine-wide constants
pub mod constants {
    /// Edge length of a compute thread group (the kernels run 8x8x1).
    pub const THREAD_GROUP_SIZE: u32 = 8;
    /// Texel format of both render targets (RGBA, 32-bit float per channel).
    pub const TARGET_BYTES_PER_PIXEL: u64 = 16;
}
