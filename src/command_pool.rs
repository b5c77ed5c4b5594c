use std::{ops::Deref, rc::Rc};

use anyhow::Result;
use ash::vk::{
    self, CommandBuffer, CommandBufferAllocateInfo, CommandBufferLevel, CommandPoolCreateFlags,
    CommandPoolCreateInfo,
};
use tracing::debug;

use crate::LogicalDevice;

pub struct CommandPool {
    logical_device: Rc<LogicalDevice>,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    pub fn new(logical_device: &Rc<LogicalDevice>, queue_family_index: u32) -> Result<Self> {
        let command_pool_create_info = CommandPoolCreateInfo::default()
            .flags(CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool =
            unsafe { logical_device.create_command_pool(&command_pool_create_info, None) }?;
        debug!("Command pool created");

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            command_pool,
        })
    }

    /// Allocates primary command buffers out of this pool. The buffers are
    /// returned to the pool when the pool itself is destroyed.
    pub fn allocate_command_buffers(&self, count: u32) -> Result<Vec<CommandBuffer>> {
        let allocate_info = CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let command_buffers =
            unsafe { self.logical_device.allocate_command_buffers(&allocate_info)? };
        Ok(command_buffers)
    }

    /// Returns a one-shot command buffer to the pool early, before the pool
    /// itself goes away.
    pub fn free_command_buffer(&self, command_buffer: CommandBuffer) {
        unsafe {
            self.logical_device
                .free_command_buffers(self.command_pool, &[command_buffer])
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        debug!("Dropping CommandPool");
        unsafe {
            self.logical_device
                .destroy_command_pool(self.command_pool, None)
        }
    }
}

impl Deref for CommandPool {
    type Target = vk::CommandPool;

    fn deref(&self) -> &Self::Target {
        &self.command_pool
    }
}
