use std::rc::Rc;

use anyhow::Result;
use ash::vk::{
    CommandBuffer, Fence, FenceCreateFlags, FenceCreateInfo, Semaphore, SemaphoreCreateInfo,
};
use tracing::debug;

use crate::{CommandPool, LogicalDevice};

/// The resources one in-flight frame cycles through: a command buffer and
/// the synchronization objects that order its acquire, submit, and present.
/// The slot's uniform data lives in the renderer's persistently-mapped
/// block, addressed by this slot's index.
pub struct FrameSlot {
    logical_device: Rc<LogicalDevice>,

    pub command_buffer: CommandBuffer,
    /// Semaphore for when the image is available to be used from the
    /// swapchain
    pub image_available_semaphore: Semaphore,
    /// Semaphore for when the rendering has finished
    pub render_finished_semaphore: Semaphore,
    /// Fence bounding reuse of this slot. Created signaled so the very
    /// first wait passes without a prior submission.
    pub in_flight_fence: Fence,
}

impl FrameSlot {
    pub fn new(logical_device: &Rc<LogicalDevice>, command_buffer: CommandBuffer) -> Result<Self> {
        let semaphore_create_info = SemaphoreCreateInfo::default();
        let fence_create_info = FenceCreateInfo::default().flags(FenceCreateFlags::SIGNALED);

        let image_available_semaphore =
            unsafe { logical_device.create_semaphore(&semaphore_create_info, None)? };
        let render_finished_semaphore = match unsafe {
            logical_device.create_semaphore(&semaphore_create_info, None)
        } {
            Ok(semaphore) => semaphore,
            Err(error) => {
                unsafe { logical_device.destroy_semaphore(image_available_semaphore, None) };
                return Err(error.into());
            }
        };
        let in_flight_fence = match unsafe {
            logical_device.create_fence(&fence_create_info, None)
        } {
            Ok(fence) => fence,
            Err(error) => {
                unsafe {
                    logical_device.destroy_semaphore(render_finished_semaphore, None);
                    logical_device.destroy_semaphore(image_available_semaphore, None);
                }
                return Err(error.into());
            }
        };

        Ok(Self {
            logical_device: Rc::clone(logical_device),
            command_buffer,
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        unsafe {
            self.logical_device
                .destroy_fence(self.in_flight_fence, None);
            self.logical_device
                .destroy_semaphore(self.image_available_semaphore, None);
            self.logical_device
                .destroy_semaphore(self.render_finished_semaphore, None);
        }
    }
}

/// Builds the `count` parallel frame slots the ring rotates through, each
/// with its own command buffer out of the shared pool.
pub fn build_frame_resources(
    logical_device: &Rc<LogicalDevice>,
    command_pool: &CommandPool,
    count: usize,
) -> Result<Vec<FrameSlot>> {
    let command_buffers = command_pool.allocate_command_buffers(count as u32)?;
    let slots = command_buffers
        .into_iter()
        .map(|command_buffer| FrameSlot::new(logical_device, command_buffer))
        .collect::<Result<Vec<_>>>()?;
    debug!("Created {} frame slots", slots.len());
    Ok(slots)
}
