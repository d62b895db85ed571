//! Renderer error types.

use lumenray_gpu::GpuError;
use thiserror::Error;

/// Errors raised while preparing or recording a frame.
#[derive(Error, Debug)]
pub enum RenderError {
    /// GPU resource creation or command recording failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// A scene buffer was requested with a stride that is not the record's size.
    #[error("{record} records are {expected} bytes wide, buffer requested with stride {actual}")]
    StrideMismatch {
        record: &'static str,
        expected: u64,
        actual: u64,
    },

    /// More scene records than the kernel's `u32` count can address.
    #[error("{0} scene records exceed the u32 record count")]
    TooManyRecords(usize),

    /// Output resolution has a zero dimension.
    #[error("cannot render at {width}x{height}")]
    EmptyResolution { width: u32, height: u32 },

    /// Sky texture could not be loaded.
    #[error("failed to load sky texture: {0}")]
    Sky(#[from] image::ImageError),

    /// Backend-specific failure (invalid handle, readback mismatch).
    #[error("backend error: {0}")]
    Backend(String),

    /// The renderer was used after `shutdown`.
    #[error("path tracer has been shut down")]
    ShutDown,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
