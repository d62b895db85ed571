//! Vulkan abstraction layer for the Lumenray path tracer.
//!
//! This crate provides:
//! - Instance, device and queue setup for compute + present
//! - Capability checks for float storage images and scalar buffer layouts
//! - Buffer and image allocation via gpu-allocator
//! - Compute pipelines, descriptor sets and image barriers
//! - Command buffers, fences and swapchain handling

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use barrier::ImageTransition;
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::ComputePipeline;
pub use surface::SurfaceContext;
pub use swapchain::Swapchain;
