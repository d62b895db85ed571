//! Compute pipeline creation.

use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;

/// Compute pipeline with its layout and push constant size.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    push_constant_size: u32,
}

impl ComputePipeline {
    /// Create a compute pipeline from SPIR-V.
    ///
    /// `push_constant_size` is the byte size of the kernel's push constant
    /// block, or zero if it has none.
    ///
    /// # Safety
    /// The device must be valid and the shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_size: u32,
    ) -> Result<Self> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(shader_code);
        let shader_module = device
            .create_shader_module(&shader_info, None)
            .map_err(|e| GpuError::ShaderModule(e.to_string()))?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(push_constant_size)];
        let ranges: &[vk::PushConstantRange] = if push_constant_size == 0 {
            &[]
        } else {
            &push_constant_ranges
        };

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(ranges);

        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(layout) => layout,
            Err(e) => {
                device.destroy_shader_module(shader_module, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let result =
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None);

        // The module is baked into the pipeline and no longer needed.
        device.destroy_shader_module(shader_module, None);

        let pipeline = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };

        Ok(Self {
            pipeline,
            layout,
            push_constant_size,
        })
    }

    /// Bind the pipeline and its descriptor set.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn bind(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
    ) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.layout,
            0,
            &[descriptor_set],
            &[],
        );
    }

    /// Push a constant block matching the size declared at creation.
    ///
    /// # Safety
    /// The command buffer must be recording with this pipeline bound.
    pub unsafe fn push_constants<T: Pod>(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        constants: &T,
    ) -> Result<()> {
        let bytes = bytemuck::bytes_of(constants);
        if bytes.len() as u32 != self.push_constant_size {
            return Err(GpuError::InvalidState(format!(
                "push constant block is {} bytes, pipeline expects {}",
                bytes.len(),
                self.push_constant_size
            )));
        }
        device.cmd_push_constants(cmd, self.layout, vk::ShaderStageFlags::COMPUTE, 0, bytes);
        Ok(())
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
