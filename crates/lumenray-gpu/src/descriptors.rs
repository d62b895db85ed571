//! Descriptor set management.

use crate::error::Result;
use ash::vk;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    fn binding(mut self, binding: u32, descriptor_type: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
        );
        self
    }

    /// Add a compute-stage storage buffer binding.
    pub fn storage_buffer(self, binding: u32) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER)
    }

    /// Add a compute-stage uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER)
    }

    /// Add a compute-stage storage image binding.
    pub fn storage_image(self, binding: u32) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE)
    }

    /// Add a compute-stage combined image sampler binding.
    pub fn sampled_image(self, binding: u32) -> Self {
        self.binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
    }

    /// Pool sizes needed to allocate `sets` descriptor sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += sets,
                None => sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(sets),
                ),
            }
        }
        sizes
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        Ok(device.create_descriptor_set_layout(&layout_info, None)?)
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one descriptor set.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = device.allocate_descriptor_sets(&alloc_info)?;
        Ok(sets[0])
    }

    /// Destroy the pool and every set allocated from it.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Batches descriptor writes for one set into a single update call.
pub struct DescriptorWriter {
    set: vk::DescriptorSet,
    buffers: Vec<(u32, vk::DescriptorType, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorType, vk::DescriptorImageInfo)>,
}

impl DescriptorWriter {
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            buffers: Vec::new(),
            images: Vec::new(),
        }
    }

    fn buffer(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    ) -> Self {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(range);
        self.buffers.push((binding, ty, info));
        self
    }

    pub fn uniform_buffer(self, binding: u32, buffer: vk::Buffer, range: u64) -> Self {
        self.buffer(binding, vk::DescriptorType::UNIFORM_BUFFER, buffer, range)
    }

    pub fn storage_buffer(self, binding: u32, buffer: vk::Buffer, range: u64) -> Self {
        self.buffer(binding, vk::DescriptorType::STORAGE_BUFFER, buffer, range)
    }

    /// Storage image accessed in the `GENERAL` layout.
    pub fn storage_image(mut self, binding: u32, view: vk::ImageView) -> Self {
        let info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::GENERAL);
        self.images
            .push((binding, vk::DescriptorType::STORAGE_IMAGE, info));
        self
    }

    /// Sampled image in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn sampled_image(mut self, binding: u32, view: vk::ImageView, sampler: vk::Sampler) -> Self {
        let info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .sampler(sampler)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        self.images
            .push((binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, info));
        self
    }

    /// Number of bindings queued.
    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every queued write.
    ///
    /// # Safety
    /// The device and every referenced handle must be valid, and the set
    /// must not be in use by a pending command buffer.
    pub unsafe fn update(self, device: &ash::Device) {
        let mut writes = Vec::with_capacity(self.len());
        for (binding, ty, info) in &self.buffers {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .buffer_info(std::slice::from_ref(info)),
            );
        }
        for (binding, ty, info) in &self.images {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info)),
            );
        }
        device.update_descriptor_sets(&writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sizes_merge_types() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0)
            .storage_buffer(1)
            .sampled_image(2)
            .storage_image(3)
            .storage_image(4);

        let sizes = builder.pool_sizes(2);
        assert_eq!(sizes.len(), 4);
        let storage_images = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::STORAGE_IMAGE)
            .unwrap();
        assert_eq!(storage_images.descriptor_count, 4);
        let uniforms = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .unwrap();
        assert_eq!(uniforms.descriptor_count, 2);
    }

    #[test]
    fn writer_queues_bindings() {
        let writer = DescriptorWriter::new(vk::DescriptorSet::null())
            .uniform_buffer(0, vk::Buffer::null(), 160)
            .storage_buffer(1, vk::Buffer::null(), 80)
            .storage_image(3, vk::ImageView::null());
        assert_eq!(writer.len(), 3);
        assert!(!writer.is_empty());
        assert_eq!(writer.images[0].2.image_layout, vk::ImageLayout::GENERAL);
    }
}
