use std::rc::Rc;

use anyhow::{ensure, Context, Result};
use ash::vk::{
    Buffer, BufferCreateInfo, BufferUsageFlags, DeviceMemory, DeviceSize, MemoryAllocateInfo,
    MemoryMapFlags, MemoryPropertyFlags, SharingMode, WHOLE_SIZE,
};
use tracing::debug;

use crate::{
    suballoc::{plan_layout, BufferRequest, PackedLayout},
    LogicalDevice,
};

/// A group of buffers packed into one device memory allocation.
///
/// Each buffer is bound at the offset the layout planner computed for it.
/// When the group was allocated with host-visible properties, the whole
/// block is mapped once at creation and stays mapped; per-buffer writes go
/// through `base + offset` into that mapping.
pub struct PackedBuffers {
    logical_device: Rc<LogicalDevice>,
    buffers: Vec<Buffer>,
    requested_sizes: Vec<DeviceSize>,
    layout: PackedLayout,
    memory: DeviceMemory,
    mapped: Option<*mut u8>,
}

impl PackedBuffers {
    /// Creates one buffer per `(size, usage)` request and binds them all
    /// into a single fresh allocation with the given memory properties.
    pub fn allocate(
        logical_device: &Rc<LogicalDevice>,
        requests: &[(DeviceSize, BufferUsageFlags)],
        required_properties: MemoryPropertyFlags,
    ) -> Result<Self> {
        let mut buffers = Vec::with_capacity(requests.len());
        for (size, usage) in requests {
            let buffer_create_info = BufferCreateInfo::default()
                .size(*size)
                .usage(*usage)
                .sharing_mode(SharingMode::EXCLUSIVE);
            match unsafe { logical_device.create_buffer(&buffer_create_info, None) } {
                Ok(buffer) => buffers.push(buffer),
                Err(error) => {
                    Self::destroy_buffers(logical_device, &buffers);
                    return Err(error).context("failed to create a buffer for the packed group");
                }
            }
        }

        let requirements = buffers
            .iter()
            .map(|buffer| {
                let requirements =
                    unsafe { logical_device.get_buffer_memory_requirements(*buffer) };
                BufferRequest {
                    size: requirements.size,
                    alignment: requirements.alignment,
                    memory_type_bits: requirements.memory_type_bits,
                }
            })
            .collect::<Vec<_>>();

        // planning happens entirely on the CPU; a failed plan means no
        // allocation was ever requested from the device
        let layout = match plan_layout(
            &requirements,
            logical_device.get_memory_properties(),
            required_properties,
        ) {
            Ok(layout) => layout,
            Err(error) => {
                Self::destroy_buffers(logical_device, &buffers);
                return Err(error.into());
            }
        };

        let allocate_info = MemoryAllocateInfo::default()
            .allocation_size(layout.total_size)
            .memory_type_index(layout.memory_type_index);
        let memory = match unsafe { logical_device.allocate_memory(&allocate_info, None) } {
            Ok(memory) => memory,
            Err(error) => {
                Self::destroy_buffers(logical_device, &buffers);
                return Err(error).context("failed to allocate the packed memory block");
            }
        };

        for (index, buffer) in buffers.iter().enumerate() {
            if let Err(error) = unsafe {
                logical_device.bind_buffer_memory(*buffer, memory, layout.offset_of(index))
            } {
                unsafe { logical_device.free_memory(memory, None) };
                Self::destroy_buffers(logical_device, &buffers);
                return Err(error).context("failed to bind a buffer to its packed offset");
            }
        }

        let mapped = if required_properties.contains(MemoryPropertyFlags::HOST_VISIBLE) {
            match unsafe {
                logical_device.map_memory(memory, 0, WHOLE_SIZE, MemoryMapFlags::empty())
            } {
                Ok(pointer) => Some(pointer.cast::<u8>()),
                Err(error) => {
                    unsafe { logical_device.free_memory(memory, None) };
                    Self::destroy_buffers(logical_device, &buffers);
                    return Err(error).context("failed to map the packed memory block");
                }
            }
        } else {
            None
        };

        debug!(
            "Bound {} buffers into one {} byte allocation",
            buffers.len(),
            layout.total_size
        );

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            buffers,
            requested_sizes: requests.iter().map(|(size, _)| *size).collect(),
            layout,
            memory,
            mapped,
        })
    }

    /// The buffer created from request `index`.
    pub fn buffer(&self, index: usize) -> Buffer {
        self.buffers[index]
    }

    /// The size the caller requested for buffer `index` (the bound region
    /// may be larger due to the device's own requirements).
    pub fn requested_size(&self, index: usize) -> DeviceSize {
        self.requested_sizes[index]
    }

    /// Copies `bytes` into buffer `index` through the persistent mapping.
    /// Only valid for host-visible groups; coherent memory needs no flush.
    pub fn write(&self, index: usize, bytes: &[u8]) -> Result<()> {
        let base = self
            .mapped
            .context("buffer group is not host-visible, use the transfer helper instead")?;
        ensure!(
            bytes.len() as DeviceSize <= self.requested_sizes[index],
            "write of {} bytes overflows buffer of {} bytes",
            bytes.len(),
            self.requested_sizes[index],
        );
        let offset = self.layout.offset_of(index);
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                base.add(offset as usize),
                bytes.len(),
            );
        }
        Ok(())
    }

    fn destroy_buffers(logical_device: &LogicalDevice, buffers: &[Buffer]) {
        for buffer in buffers {
            unsafe { logical_device.destroy_buffer(*buffer, None) }
        }
    }
}

impl Drop for PackedBuffers {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.logical_device.unmap_memory(self.memory);
            }
        }
        Self::destroy_buffers(&self.logical_device, &self.buffers);
        unsafe { self.logical_device.free_memory(self.memory, None) };
    }
}
