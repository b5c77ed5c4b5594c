use std::rc::Rc;

use anyhow::{Context, Result};
use ash::vk::{
    Buffer, BufferCopy, BufferCreateInfo, BufferUsageFlags, CommandBufferBeginInfo,
    CommandBufferUsageFlags, DeviceMemory, DeviceSize, Fence, MemoryAllocateInfo, MemoryMapFlags,
    MemoryPropertyFlags, SharingMode, SubmitInfo, WHOLE_SIZE,
};
use tracing::debug;

use crate::{
    suballoc::{plan_layout, BufferRequest},
    CommandPool, LogicalDevice,
};

/// The operations the staging upload needs from whatever executes it. The
/// production implementation records a one-shot command buffer on the
/// graphics queue; tests substitute an in-memory double.
pub trait TransferBackend {
    type Staging;
    type Target;

    /// A host-visible staging buffer pre-filled with `bytes`.
    fn create_staging(&mut self, bytes: &[u8]) -> Result<Self::Staging>;

    /// Copies `size` bytes from staging into the target and blocks until the
    /// copy has fully executed.
    fn copy_and_wait(
        &mut self,
        staging: &Self::Staging,
        target: &Self::Target,
        size: DeviceSize,
    ) -> Result<()>;

    fn destroy_staging(&mut self, staging: Self::Staging);
}

/// Moves `bytes` into `target` through a temporary staging buffer.
///
/// Blocking and non-pipelined: only meant for setup-time uploads, never for
/// the per-frame path. The staging buffer is reclaimed before returning,
/// on the error path as well.
pub fn upload<B: TransferBackend>(backend: &mut B, bytes: &[u8], target: &B::Target) -> Result<()> {
    let staging = backend.create_staging(bytes)?;
    let copied = backend.copy_and_wait(&staging, target, bytes.len() as DeviceSize);
    backend.destroy_staging(staging);
    copied
}

/// One-shot transfer executor over the graphics queue.
pub struct GraphicsTransfer<'a> {
    logical_device: &'a Rc<LogicalDevice>,
    command_pool: &'a CommandPool,
}

impl<'a> GraphicsTransfer<'a> {
    pub fn new(logical_device: &'a Rc<LogicalDevice>, command_pool: &'a CommandPool) -> Self {
        Self {
            logical_device,
            command_pool,
        }
    }

    /// Allocates, binds, and fills the memory behind a freshly created
    /// staging buffer. Frees the memory again if any step fails; the buffer
    /// itself stays the caller's to clean up.
    fn back_staging(device: &LogicalDevice, buffer: Buffer, bytes: &[u8]) -> Result<DeviceMemory> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let request = BufferRequest {
            size: requirements.size,
            alignment: requirements.alignment,
            memory_type_bits: requirements.memory_type_bits,
        };

        // degenerate single-buffer plan, reusing the classification rules
        let layout = plan_layout(
            &[request],
            device.get_memory_properties(),
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let allocate_info = MemoryAllocateInfo::default()
            .allocation_size(layout.total_size)
            .memory_type_index(layout.memory_type_index);
        let memory = unsafe { device.allocate_memory(&allocate_info, None) }
            .context("failed to allocate staging memory")?;

        let filled = unsafe {
            match device.bind_buffer_memory(buffer, memory, 0) {
                Ok(()) => device.map_memory(memory, 0, WHOLE_SIZE, MemoryMapFlags::empty()),
                Err(error) => Err(error),
            }
        };
        match filled {
            Ok(pointer) => unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), pointer.cast::<u8>(), bytes.len());
                // coherent memory, no flush needed before the unmap
                device.unmap_memory(memory);
                Ok(memory)
            },
            Err(error) => {
                unsafe { device.free_memory(memory, None) };
                Err(error).context("failed to fill the staging buffer")
            }
        }
    }
}

pub struct StagingBuffer {
    buffer: Buffer,
    memory: DeviceMemory,
}

impl TransferBackend for GraphicsTransfer<'_> {
    type Staging = StagingBuffer;
    type Target = Buffer;

    fn create_staging(&mut self, bytes: &[u8]) -> Result<StagingBuffer> {
        let device = self.logical_device;

        let buffer_create_info = BufferCreateInfo::default()
            .size(bytes.len() as DeviceSize)
            .usage(BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_create_info, None) }
            .context("failed to create the staging buffer")?;

        match Self::back_staging(device, buffer, bytes) {
            Ok(memory) => Ok(StagingBuffer { buffer, memory }),
            Err(error) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(error)
            }
        }
    }

    fn copy_and_wait(
        &mut self,
        staging: &StagingBuffer,
        target: &Buffer,
        size: DeviceSize,
    ) -> Result<()> {
        let device = self.logical_device;
        let command_buffer = self.command_pool.allocate_command_buffers(1)?[0];

        let submitted = (|| {
            let begin_info = CommandBufferBeginInfo::default()
                .flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe {
                device.begin_command_buffer(command_buffer, &begin_info)?;
                let region = BufferCopy::default().size(size);
                device.cmd_copy_buffer(command_buffer, staging.buffer, *target, &[region]);
                device.end_command_buffer(command_buffer)?;

                let command_buffers = [command_buffer];
                let submit_info = SubmitInfo::default().command_buffers(&command_buffers);
                let graphics_queue = device.get_queues().graphics;
                device.queue_submit(graphics_queue, &[submit_info], Fence::null())?;
                // setup-time transfer, so draining the whole queue is fine
                device.queue_wait_idle(graphics_queue)?;
            }
            Ok::<_, ash::vk::Result>(())
        })();

        self.command_pool.free_command_buffer(command_buffer);
        submitted.context("failed to submit the staging copy")?;
        debug!("Staged {} bytes into a device local buffer", size);
        Ok(())
    }

    fn destroy_staging(&mut self, staging: StagingBuffer) {
        unsafe {
            self.logical_device.destroy_buffer(staging.buffer, None);
            self.logical_device.free_memory(staging.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;

    /// Backend where "device memory" is a plain byte vector.
    struct InMemoryTransfer {
        staging_live: usize,
        fail_copy: bool,
    }

    impl InMemoryTransfer {
        fn new() -> Self {
            Self {
                staging_live: 0,
                fail_copy: false,
            }
        }
    }

    impl TransferBackend for InMemoryTransfer {
        type Staging = Vec<u8>;
        type Target = RefCell<Vec<u8>>;

        fn create_staging(&mut self, bytes: &[u8]) -> Result<Vec<u8>> {
            self.staging_live += 1;
            Ok(bytes.to_vec())
        }

        fn copy_and_wait(
            &mut self,
            staging: &Vec<u8>,
            target: &RefCell<Vec<u8>>,
            size: DeviceSize,
        ) -> Result<()> {
            if self.fail_copy {
                return Err(anyhow!("copy submission failed"));
            }
            let size = size as usize;
            target.borrow_mut()[..size].copy_from_slice(&staging[..size]);
            Ok(())
        }

        fn destroy_staging(&mut self, _staging: Vec<u8>) {
            self.staging_live -= 1;
        }
    }

    #[test]
    fn round_trip_preserves_every_byte() {
        let payload = (0..=255u8).cycle().take(1000).collect::<Vec<_>>();
        let destination = RefCell::new(vec![0u8; payload.len()]);

        let mut backend = InMemoryTransfer::new();
        upload(&mut backend, &payload, &destination).unwrap();

        assert_eq!(*destination.borrow(), payload);
    }

    #[test]
    fn staging_is_reclaimed_after_the_copy() {
        let destination = RefCell::new(vec![0u8; 4]);
        let mut backend = InMemoryTransfer::new();

        upload(&mut backend, &[1, 2, 3, 4], &destination).unwrap();

        assert_eq!(backend.staging_live, 0);
    }

    #[test]
    fn staging_is_reclaimed_when_the_copy_fails() {
        let destination = RefCell::new(vec![0u8; 4]);
        let mut backend = InMemoryTransfer::new();
        backend.fail_copy = true;

        let result = upload(&mut backend, &[1, 2, 3, 4], &destination);

        assert!(result.is_err());
        assert_eq!(backend.staging_live, 0);
        assert_eq!(*destination.borrow(), vec![0u8; 4]);
    }
}
