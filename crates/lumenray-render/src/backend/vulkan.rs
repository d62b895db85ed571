//! Vulkan implementation of [`RenderBackend`].

use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use lumenray_gpu::capabilities::RENDER_TARGET_FORMAT;
use lumenray_gpu::command::execute_single_time_commands;
use lumenray_gpu::{
    barrier, CommandPool, ComputePipeline, DescriptorPool, DescriptorSetLayoutBuilder,
    DescriptorWriter, GpuBuffer, GpuContext, GpuError, GpuImage, ImageTransition,
};
use tracing::{debug, info};

use super::{Readback, RenderBackend, TargetRole, TraceBindings};
use crate::dispatch::{thread_groups, ThreadGroups};
use crate::error::{RenderError, Result};
use crate::frame_params::GpuFrameUniforms;
use crate::sky::SkyImage;

const SKY_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TracePushConstants {
    resolution: [u32; 2],
    sphere_count: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct AccumulatePushConstants {
    resolution: [u32; 2],
    weight: f32,
    _pad: u32,
}

/// Recording state for one displayed frame.
pub struct VulkanFrame {
    /// Command buffer in the recording state.
    pub command_buffer: vk::CommandBuffer,
    /// Swapchain image to blit into; null when rendering headless.
    pub swapchain_image: vk::Image,
    pub extent: vk::Extent2D,
}

struct PendingReadback {
    buffer: GpuBuffer,
    width: u32,
    height: u32,
}

/// Records trace, blend and blit commands with the kernels from
/// `lumenray-shaders`.
///
/// Descriptor sets are rewritten on every dispatch. The caller must keep at
/// most one frame in flight and wait for it before recording the next, so a
/// set is never updated while the GPU still reads it.
pub struct VulkanBackend {
    gpu: Arc<GpuContext>,
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
    trace_layout: vk::DescriptorSetLayout,
    accumulate_layout: vk::DescriptorSetLayout,
    trace_set: vk::DescriptorSet,
    accumulate_set: vk::DescriptorSet,
    trace_pipeline: ComputePipeline,
    accumulate_pipeline: ComputePipeline,
    uniforms: GpuBuffer,
    sampler: vk::Sampler,
    sky: Option<GpuImage>,
    readback: Option<PendingReadback>,
    destroyed: bool,
}

impl VulkanBackend {
    pub fn new(gpu: Arc<GpuContext>) -> Result<Self> {
        let device = gpu.device();

        let trace_bindings = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0)
            .storage_buffer(1)
            .sampled_image(2)
            .storage_image(3);
        let accumulate_bindings = DescriptorSetLayoutBuilder::new()
            .storage_image(0)
            .storage_image(1);

        let mut pool_sizes = trace_bindings.pool_sizes(1);
        pool_sizes.extend(accumulate_bindings.pool_sizes(1));

        // SAFETY: the device outlives every object created here; `destroy`
        // releases them before the context is dropped.
        let (trace_layout, accumulate_layout, descriptor_pool, trace_set, accumulate_set) = unsafe {
            let trace_layout = trace_bindings.build(device)?;
            let accumulate_layout = accumulate_bindings.build(device)?;
            let descriptor_pool = DescriptorPool::new(device, 2, &pool_sizes)?;
            let trace_set = descriptor_pool.allocate(device, trace_layout)?;
            let accumulate_set = descriptor_pool.allocate(device, accumulate_layout)?;
            (trace_layout, accumulate_layout, descriptor_pool, trace_set, accumulate_set)
        };

        let (trace_pipeline, accumulate_pipeline) = unsafe {
            let trace = ComputePipeline::new(
                device,
                lumenray_shaders::path_trace_shader(),
                &[trace_layout],
                std::mem::size_of::<TracePushConstants>() as u32,
            )?;
            let accumulate = ComputePipeline::new(
                device,
                lumenray_shaders::accumulate_shader(),
                &[accumulate_layout],
                std::mem::size_of::<AccumulatePushConstants>() as u32,
            )?;
            (trace, accumulate)
        };

        let command_pool = unsafe { CommandPool::new(device, gpu.queue_family())? };

        let uniforms = gpu.allocator().lock().create_buffer(
            GpuFrameUniforms::SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "frame_uniforms",
        )?;

        let sampler = create_sky_sampler(&gpu)?;

        info!("Vulkan path tracing backend ready on {}", gpu.capabilities().device_name);

        Ok(Self {
            gpu,
            command_pool,
            descriptor_pool,
            trace_layout,
            accumulate_layout,
            trace_set,
            accumulate_set,
            trace_pipeline,
            accumulate_pipeline,
            uniforms,
            sampler,
            sky: None,
            readback: None,
            destroyed: false,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    fn one_shot(&self, record: impl FnOnce(vk::CommandBuffer)) -> Result<()> {
        unsafe {
            execute_single_time_commands(self.device(), &self.command_pool, self.gpu.queue(), record)?;
        }
        Ok(())
    }

    fn free_sky(&mut self) -> Result<()> {
        if let Some(mut sky) = self.sky.take() {
            self.gpu.wait_idle()?;
            self.gpu.allocator().lock().free_image(&mut sky)?;
        }
        Ok(())
    }
}

/// Linear filtering if the device can filter float textures, nearest otherwise.
fn create_sky_sampler(gpu: &GpuContext) -> Result<vk::Sampler> {
    let props = unsafe {
        gpu.instance()
            .get_physical_device_format_properties(gpu.physical_device(), SKY_FORMAT)
    };
    let filter = if props
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        vk::Filter::LINEAR
    } else {
        debug!("rgba32f filtering unsupported, sampling sky with nearest");
        vk::Filter::NEAREST
    };

    let info = vk::SamplerCreateInfo::default()
        .mag_filter(filter)
        .min_filter(filter)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .max_lod(0.0);
    Ok(unsafe { gpu.device().create_sampler(&info, None) }.map_err(GpuError::from)?)
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

fn corner(width: u32, height: u32) -> vk::Offset3D {
    vk::Offset3D {
        x: width as i32,
        y: height as i32,
        z: 1,
    }
}

impl RenderBackend for VulkanBackend {
    type Buffer = GpuBuffer;
    type Target = GpuImage;
    type Frame = VulkanFrame;

    fn frame_extent(&self, frame: &VulkanFrame) -> (u32, u32) {
        (frame.extent.width, frame.extent.height)
    }

    fn create_buffer(&mut self, size: u64) -> Result<GpuBuffer> {
        Ok(self.gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            "scene_spheres",
        )?)
    }

    fn write_buffer(&mut self, buffer: &mut GpuBuffer, bytes: &[u8]) -> Result<()> {
        Ok(buffer.write_bytes(0, bytes)?)
    }

    fn release_buffer(&mut self, mut buffer: GpuBuffer) -> Result<()> {
        Ok(self.gpu.allocator().lock().free_buffer(&mut buffer)?)
    }

    fn create_target(&mut self, role: TargetRole, width: u32, height: u32) -> Result<GpuImage> {
        let mut image = self.gpu.allocator().lock().create_image_2d(
            width,
            height,
            RENDER_TARGET_FORMAT,
            vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            role.name(),
        )?;

        // GENERAL layout, cleared to zero, visible to the kernels.
        let handle = image.image;
        let device = self.gpu.device().clone();
        let cleared = self.one_shot(|cmd| unsafe {
            barrier::record(&device, cmd, &[ImageTransition::init_storage(handle)]);
            device.cmd_clear_color_image(
                cmd,
                handle,
                vk::ImageLayout::GENERAL,
                &vk::ClearColorValue { float32: [0.0; 4] },
                &[lumenray_gpu::memory::color_subresource_range()],
            );
            barrier::record(
                &device,
                cmd,
                &[ImageTransition {
                    old_layout: vk::ImageLayout::GENERAL,
                    src_stage: vk::PipelineStageFlags2::CLEAR,
                    src_access: vk::AccessFlags2::TRANSFER_WRITE,
                    ..ImageTransition::compute_to_compute(handle)
                }],
            );
        });
        if let Err(err) = cleared {
            self.gpu.allocator().lock().free_image(&mut image)?;
            return Err(err);
        }

        debug!("Created {} ({width}x{height})", role.name());
        Ok(image)
    }

    fn release_target(&mut self, mut target: GpuImage) -> Result<()> {
        Ok(self.gpu.allocator().lock().free_image(&mut target)?)
    }

    fn upload_sky(&mut self, sky: &SkyImage) -> Result<()> {
        self.free_sky()?;

        let bytes = sky.as_bytes();
        let mut staging = self.gpu.allocator().lock().create_buffer(
            bytes.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "sky_staging",
        )?;
        let mut image = match staging.write_bytes(0, bytes).and_then(|()| {
            self.gpu.allocator().lock().create_image_2d(
                sky.width,
                sky.height,
                SKY_FORMAT,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                "sky",
            )
        }) {
            Ok(image) => image,
            Err(err) => {
                self.gpu.allocator().lock().free_buffer(&mut staging)?;
                return Err(err.into());
            }
        };

        let device = self.gpu.device().clone();
        let (src, dst) = (staging.buffer, image.image);
        let (width, height) = (sky.width, sky.height);
        let uploaded = self.one_shot(|cmd| unsafe {
            barrier::record(&device, cmd, &[ImageTransition::undefined_to_transfer_dst(dst)]);
            let region = vk::BufferImageCopy::default()
                .image_subresource(color_layers())
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            device.cmd_copy_buffer_to_image(
                cmd,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            barrier::record(&device, cmd, &[ImageTransition::transfer_dst_to_sampled(dst)]);
        });

        let mut allocator = self.gpu.allocator().lock();
        allocator.free_buffer(&mut staging)?;
        if let Err(err) = uploaded {
            allocator.free_image(&mut image)?;
            return Err(err);
        }
        drop(allocator);

        debug!("Uploaded sky texture ({width}x{height})");
        self.sky = Some(image);
        Ok(())
    }

    fn dispatch_trace(
        &mut self,
        frame: &mut VulkanFrame,
        bindings: &TraceBindings<'_, Self>,
        uniforms: &GpuFrameUniforms,
        groups: ThreadGroups,
    ) -> Result<()> {
        let sky = self
            .sky
            .as_ref()
            .ok_or_else(|| RenderError::Backend("sky texture not uploaded".to_string()))?;
        self.uniforms.write_pod(std::slice::from_ref(uniforms))?;

        let device = self.gpu.device();
        let cmd = frame.command_buffer;
        let push = TracePushConstants {
            resolution: [bindings.width, bindings.height],
            sphere_count: bindings.sphere_count,
            _pad: 0,
        };

        unsafe {
            DescriptorWriter::new(self.trace_set)
                .uniform_buffer(0, self.uniforms.buffer, GpuFrameUniforms::SIZE)
                .storage_buffer(1, bindings.scene.buffer, bindings.scene.size)
                .sampled_image(2, sky.view, self.sampler)
                .storage_image(3, bindings.raw.view)
                .update(device);

            self.trace_pipeline.bind(device, cmd, self.trace_set);
            self.trace_pipeline.push_constants(device, cmd, &push)?;
            device.cmd_dispatch(cmd, groups.x, groups.y, groups.z);
        }
        Ok(())
    }

    fn blend(
        &mut self,
        frame: &mut VulkanFrame,
        raw: &GpuImage,
        accumulated: &GpuImage,
        weight: f32,
    ) -> Result<()> {
        let device = self.gpu.device();
        let cmd = frame.command_buffer;
        let (width, height) = (raw.width(), raw.height());
        let groups = thread_groups(width, height)?;
        let push = AccumulatePushConstants {
            resolution: [width, height],
            weight,
            _pad: 0,
        };

        unsafe {
            // Trace writes to `raw` land before the blend reads them.
            barrier::record(
                device,
                cmd,
                &[
                    ImageTransition::compute_to_compute(raw.image),
                    ImageTransition::compute_to_compute(accumulated.image),
                ],
            );
            DescriptorWriter::new(self.accumulate_set)
                .storage_image(0, raw.view)
                .storage_image(1, accumulated.view)
                .update(device);

            self.accumulate_pipeline.bind(device, cmd, self.accumulate_set);
            self.accumulate_pipeline.push_constants(device, cmd, &push)?;
            device.cmd_dispatch(cmd, groups.x, groups.y, groups.z);
        }
        Ok(())
    }

    fn present(&mut self, frame: &mut VulkanFrame, source: &GpuImage) -> Result<()> {
        if frame.swapchain_image == vk::Image::null() {
            return Ok(());
        }
        let device = self.gpu.device();
        let cmd = frame.command_buffer;
        let (width, height) = (source.width(), source.height());
        let (dst_w, dst_h) = (frame.extent.width, frame.extent.height);

        let blit = vk::ImageBlit::default()
            .src_subresource(color_layers())
            .src_offsets([vk::Offset3D::default(), corner(width, height)])
            .dst_subresource(color_layers())
            .dst_offsets([vk::Offset3D::default(), corner(dst_w, dst_h)]);

        unsafe {
            barrier::record(
                device,
                cmd,
                &[
                    ImageTransition::compute_to_transfer_src(source.image),
                    ImageTransition::undefined_to_transfer_dst(frame.swapchain_image),
                ],
            );
            device.cmd_blit_image(
                cmd,
                source.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                frame.swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::NEAREST,
            );
            barrier::record(
                device,
                cmd,
                &[
                    ImageTransition::transfer_dst_to_present(frame.swapchain_image),
                    ImageTransition::transfer_src_to_compute(source.image),
                ],
            );
        }
        Ok(())
    }

    fn record_readback(&mut self, frame: &mut VulkanFrame, source: &GpuImage) -> Result<()> {
        let (width, height) = (source.width(), source.height());
        let size = u64::from(width) * u64::from(height) * lumenray_core::constants::TARGET_BYTES_PER_PIXEL;

        if let Some(mut stale) = self.readback.take() {
            self.gpu.allocator().lock().free_buffer(&mut stale.buffer)?;
        }
        let buffer = self.gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "capture_readback",
        )?;

        let device = self.gpu.device();
        let cmd = frame.command_buffer;
        let region = vk::BufferImageCopy::default()
            .image_subresource(color_layers())
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });
        let host_visible = [vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::HOST)
            .dst_access_mask(vk::AccessFlags2::HOST_READ)];

        unsafe {
            barrier::record(device, cmd, &[ImageTransition::compute_to_transfer_src(source.image)]);
            device.cmd_copy_image_to_buffer(
                cmd,
                source.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer.buffer,
                &[region],
            );
            barrier::record(device, cmd, &[ImageTransition::transfer_src_to_compute(source.image)]);
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().memory_barriers(&host_visible),
            );
        }

        self.readback = Some(PendingReadback {
            buffer,
            width,
            height,
        });
        Ok(())
    }

    fn take_readback(&mut self) -> Result<Option<Readback>> {
        let Some(mut pending) = self.readback.take() else {
            return Ok(None);
        };
        // Captures are rare; waiting for the queue keeps the frame loop simple.
        self.gpu.wait_idle()?;

        let texels = pending.width as usize * pending.height as usize;
        let bytes = pending.buffer.read_bytes(texels * 16);
        self.gpu.allocator().lock().free_buffer(&mut pending.buffer)?;
        let bytes = bytes?;

        Ok(Some(Readback {
            width: pending.width,
            height: pending.height,
            pixels: bytes.chunks_exact(16).map(bytemuck::pod_read_unaligned).collect(),
        }))
    }

    fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.gpu.wait_idle()?;
        self.free_sky()?;
        {
            let mut allocator = self.gpu.allocator().lock();
            if let Some(mut pending) = self.readback.take() {
                allocator.free_buffer(&mut pending.buffer)?;
            }
            allocator.free_buffer(&mut self.uniforms)?;
        }

        let device = self.gpu.device();
        unsafe {
            device.destroy_sampler(self.sampler, None);
            self.trace_pipeline.destroy(device);
            self.accumulate_pipeline.destroy(device);
            self.descriptor_pool.destroy(device);
            device.destroy_descriptor_set_layout(self.trace_layout, None);
            device.destroy_descriptor_set_layout(self.accumulate_layout, None);
            self.command_pool.destroy(device);
        }
        self.destroyed = true;
        info!("Vulkan path tracing backend destroyed");
        Ok(())
    }
}
