use std::{ops::Deref, rc::Rc};

use anyhow::Result;
use ash::vk::{
    self, Buffer, DescriptorBufferInfo, DescriptorPoolCreateInfo, DescriptorPoolSize,
    DescriptorSet, DescriptorSetAllocateInfo, DescriptorSetLayoutBinding,
    DescriptorSetLayoutCreateInfo, DescriptorType, DeviceSize, ShaderStageFlags,
    WriteDescriptorSet,
};

use crate::LogicalDevice;

/// Layout of the per-frame descriptor set: a single uniform buffer visible
/// to the vertex stage.
pub struct DescriptorSetLayout {
    logical_device: Rc<LogicalDevice>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(logical_device: &Rc<LogicalDevice>) -> Result<Self> {
        let bindings = [DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(ShaderStageFlags::VERTEX)];
        let layout_create_info = DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout =
            unsafe { logical_device.create_descriptor_set_layout(&layout_create_info, None)? };

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            layout,
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.logical_device
                .destroy_descriptor_set_layout(self.layout, None)
        }
    }
}

impl Deref for DescriptorSetLayout {
    type Target = vk::DescriptorSetLayout;

    fn deref(&self) -> &Self::Target {
        &self.layout
    }
}

/// One uniform-buffer descriptor set per frame slot, all allocated from a
/// pool sized exactly for them. Sets are returned with the pool.
pub struct FrameDescriptors {
    logical_device: Rc<LogicalDevice>,
    pool: vk::DescriptorPool,
    sets: Vec<DescriptorSet>,
}

impl FrameDescriptors {
    /// `uniform_buffers` holds each slot's buffer handle and the byte range
    /// the shader reads from it.
    pub fn new(
        logical_device: &Rc<LogicalDevice>,
        layout: &DescriptorSetLayout,
        uniform_buffers: &[(Buffer, DeviceSize)],
    ) -> Result<Self> {
        let count = uniform_buffers.len() as u32;

        let pool_sizes = [DescriptorPoolSize::default()
            .ty(DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(count)];
        let pool_create_info = DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(count);
        let pool =
            unsafe { logical_device.create_descriptor_pool(&pool_create_info, None)? };

        let layouts = vec![**layout; uniform_buffers.len()];
        let allocate_info = DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { logical_device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets,
            Err(error) => {
                unsafe { logical_device.destroy_descriptor_pool(pool, None) };
                return Err(error.into());
            }
        };

        for (set, (buffer, range)) in sets.iter().zip(uniform_buffers) {
            let buffer_info = [DescriptorBufferInfo::default()
                .buffer(*buffer)
                .offset(0)
                .range(*range)];
            let write = WriteDescriptorSet::default()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info);
            unsafe { logical_device.update_descriptor_sets(&[write], &[]) };
        }

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            pool,
            sets,
        })
    }

    pub fn set_for_slot(&self, slot: usize) -> DescriptorSet {
        self.sets[slot]
    }
}

impl Drop for FrameDescriptors {
    fn drop(&mut self) {
        unsafe {
            self.logical_device
                .destroy_descriptor_pool(self.pool, None)
        }
    }
}
