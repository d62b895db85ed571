//! Errors raised by the Vulkan layer.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpuError {
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader library is missing or unusable.
    #[error("could not load Vulkan: {0}")]
    Loader(String),

    /// No device offers compute, rgba32f storage images and scalar layouts.
    #[error("no GPU supports the path tracing kernels")]
    NoSuitableDevice,

    #[error("GPU allocation failed: {0}")]
    AllocationFailed(String),

    #[error("cannot create window surface: {0}")]
    SurfaceCreation(String),

    #[error("cannot create swapchain: {0}")]
    SwapchainCreation(String),

    /// Acquire found the swapchain stale; recreate it and try again.
    #[error("swapchain out of date")]
    SwapchainOutOfDate,

    #[error("invalid SPIR-V module: {0}")]
    ShaderModule(String),

    #[error("compute pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// An object was used after shutdown or outside its bounds.
    #[error("invalid GPU state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, GpuError>;
