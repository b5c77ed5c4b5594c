use std::{mem::size_of, rc::Rc};

use anyhow::Result;
use ash::vk::{
    BufferUsageFlags, ClearColorValue, ClearValue, CommandBufferBeginInfo,
    CommandBufferResetFlags, DeviceSize, IndexType, MemoryPropertyFlags, PipelineBindPoint,
    PipelineStageFlags, PresentInfoKHR, Rect2D, RenderPassBeginInfo, SubmitInfo, SubpassContents,
    Viewport,
};
use tracing::debug;

use crate::{
    build_frame_resources,
    frame_ring::{FrameBackend, FrameRing},
    transfer::{upload, GraphicsTransfer},
    CommandPool, DescriptorSetLayout, Framebuffer, FrameDescriptors, FrameSlot, GraphicsPipeline,
    LogicalDevice, PackedBuffers, PipelineLayout, QuadUniforms, RenderPass, Swapchain,
    QUAD_INDICES, QUAD_VERTICES,
};

// request indices inside the device-local geometry group
const VERTEX_BUFFER: usize = 0;
const INDEX_BUFFER: usize = 1;

/// Owns the per-frame GPU state and drives the frame ring over it.
pub struct Renderer {
    ring: FrameRing,
    frames: FrameContext,
}

impl Renderer {
    /// Builds all per-frame resources: the packed geometry and uniform
    /// allocations, descriptor sets, and `frame_count` frame slots.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logical_device: &Rc<LogicalDevice>,
        swapchain: &Rc<Swapchain>,
        render_pass: &Rc<RenderPass>,
        pipeline_layout: &Rc<PipelineLayout>,
        pipeline: &Rc<GraphicsPipeline>,
        descriptor_set_layout: &DescriptorSetLayout,
        framebuffers: Vec<Framebuffer>,
        frame_count: usize,
    ) -> Result<Self> {
        let graphics_family = logical_device
            .get_queue_family_indices()
            .graphics_family
            .unwrap();
        let command_pool = CommandPool::new(logical_device, graphics_family)?;

        // one device-local allocation holding the quad's vertices and
        // indices, filled through the staging path
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let index_bytes: &[u8] = bytemuck::cast_slice(&QUAD_INDICES);
        let geometry = PackedBuffers::allocate(
            logical_device,
            &[
                (
                    vertex_bytes.len() as DeviceSize,
                    BufferUsageFlags::VERTEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
                ),
                (
                    index_bytes.len() as DeviceSize,
                    BufferUsageFlags::INDEX_BUFFER | BufferUsageFlags::TRANSFER_DST,
                ),
            ],
            MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut transfer = GraphicsTransfer::new(logical_device, &command_pool);
        let vertex_buffer = geometry.buffer(VERTEX_BUFFER);
        upload(&mut transfer, vertex_bytes, &vertex_buffer)?;
        let index_buffer = geometry.buffer(INDEX_BUFFER);
        upload(&mut transfer, index_bytes, &index_buffer)?;

        // one host-visible allocation holding every slot's uniform buffer,
        // mapped once and written through every frame
        let uniform_size = size_of::<QuadUniforms>() as DeviceSize;
        let uniform_requests =
            vec![(uniform_size, BufferUsageFlags::UNIFORM_BUFFER); frame_count];
        let uniforms = PackedBuffers::allocate(
            logical_device,
            &uniform_requests,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let uniform_bindings = (0..frame_count)
            .map(|slot| (uniforms.buffer(slot), uniform_size))
            .collect::<Vec<_>>();
        let descriptors =
            FrameDescriptors::new(logical_device, descriptor_set_layout, &uniform_bindings)?;

        let slots = build_frame_resources(logical_device, &command_pool, frame_count)?;

        let extent = swapchain.get_extent();
        let shader_globals = QuadUniforms::aspect_corrected(extent.width, extent.height);

        debug!("Renderer ready with {} frames in flight", frame_count);

        Ok(Self {
            ring: FrameRing::new(frame_count),
            frames: FrameContext {
                slots,
                descriptors,
                uniforms,
                geometry,
                framebuffers,
                command_pool,
                index_count: QUAD_INDICES.len() as u32,
                shader_globals,
                logical_device: Rc::clone(logical_device),
                swapchain: Rc::clone(swapchain),
                render_pass: Rc::clone(render_pass),
                pipeline_layout: Rc::clone(pipeline_layout),
                pipeline: Rc::clone(pipeline),
            },
        })
    }

    /// Runs one iteration of the draw loop. Any error is fatal to the
    /// renderer: the current slot is left mid-protocol.
    pub fn draw_frame(&mut self) -> Result<()> {
        self.ring.draw_frame(&mut self.frames)
    }
}

/// The Vulkan half of the frame driver: every `FrameBackend` step executed
/// against the real device, swapchain, and queues.
struct FrameContext {
    // dropped before the pool and the shared guards below
    slots: Vec<FrameSlot>,
    descriptors: FrameDescriptors,
    uniforms: PackedBuffers,
    geometry: PackedBuffers,
    framebuffers: Vec<Framebuffer>,
    command_pool: CommandPool,
    index_count: u32,
    shader_globals: QuadUniforms,
    logical_device: Rc<LogicalDevice>,
    swapchain: Rc<Swapchain>,
    render_pass: Rc<RenderPass>,
    pipeline_layout: Rc<PipelineLayout>,
    pipeline: Rc<GraphicsPipeline>,
}

impl FrameContext {
    fn slot(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    fn record_commands(&self, slot: usize, image_index: u32) -> Result<()> {
        let device = &self.logical_device;
        let command_buffer = self.slot(slot).command_buffer;

        let command_buffer_begin_info = CommandBufferBeginInfo::default();
        unsafe { device.begin_command_buffer(command_buffer, &command_buffer_begin_info)? };

        let extent = *self.swapchain.get_extent();
        let render_area = Rect2D::default().extent(extent);
        let clear_values = [ClearValue {
            color: ClearColorValue {
                float32: [32.0 / 255.0, 33.0 / 255.0, 36.0 / 255.0, 1.0],
            },
        }];

        let render_pass_begin_info = RenderPassBeginInfo::default()
            .render_pass(**self.render_pass)
            .framebuffer(*self.framebuffers[image_index as usize])
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewports = [Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)];
        let scissors = [Rect2D::default().extent(extent)];

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin_info,
                SubpassContents::INLINE,
            );
            device.cmd_bind_pipeline(
                command_buffer,
                PipelineBindPoint::GRAPHICS,
                **self.pipeline,
            );
            device.cmd_set_viewport(command_buffer, 0, &viewports);
            device.cmd_set_scissor(command_buffer, 0, &scissors);
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.geometry.buffer(VERTEX_BUFFER)],
                &[0],
            );
            device.cmd_bind_index_buffer(
                command_buffer,
                self.geometry.buffer(INDEX_BUFFER),
                0,
                IndexType::UINT16,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                PipelineBindPoint::GRAPHICS,
                **self.pipeline_layout,
                0,
                &[self.descriptors.set_for_slot(slot)],
                &[],
            );
            device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            device.cmd_end_render_pass(command_buffer);
            device.end_command_buffer(command_buffer)?;
        }

        Ok(())
    }
}

impl FrameBackend for FrameContext {
    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        let fences = [self.slot(slot).in_flight_fence];
        // wait for the previous use of this slot to complete; an infinite
        // timeout means a hung driver stalls the process
        unsafe { self.logical_device.wait_for_fences(&fences, true, u64::MAX)? };
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        self.swapchain
            .acquire_next_image_index(&self.slot(slot).image_available_semaphore)
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        let fences = [self.slot(slot).in_flight_fence];
        // reset so the fence can be re-signaled when this frame completes
        unsafe { self.logical_device.reset_fences(&fences)? };
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.uniforms
            .write(slot, bytemuck::bytes_of(&self.shader_globals))?;

        unsafe {
            self.logical_device.reset_command_buffer(
                self.slot(slot).command_buffer,
                CommandBufferResetFlags::empty(),
            )?
        };
        self.record_commands(slot, image_index)
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame_slot = self.slot(slot);
        let wait_semaphores = [frame_slot.image_available_semaphore];
        let signal_semaphores = [frame_slot.render_finished_semaphore];
        let pipeline_stage_flags = [PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame_slot.command_buffer];
        let submit_info = [SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&pipeline_stage_flags)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)];
        unsafe {
            self.logical_device.queue_submit(
                self.logical_device.get_queues().graphics,
                &submit_info,
                frame_slot.in_flight_fence,
            )?
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let wait_semaphores = [self.slot(slot).render_finished_semaphore];
        let swapchains = [*self.swapchain.get_handle()];
        let image_indices = [image_index];
        let present_info = PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        self.swapchain
            .queue_present(self.logical_device.get_queues().present, &present_info)
    }
}
