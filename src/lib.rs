use std::ffi::CStr;

use anyhow::Result;
use ash::vk::{
    Bool32, DebugUtilsMessageSeverityFlagsEXT, DebugUtilsMessageTypeFlagsEXT,
    DebugUtilsMessengerCallbackDataEXT, DebugUtilsMessengerCreateInfoEXT,
};
use simple_logger::{set_up_color_terminal, SimpleLogger};
use tracing::{event, Level};

mod command_pool;
mod descriptors;
mod frame_ring;
mod frame_slot;
mod graphics_pipeline;
mod image_view;
mod instance;
mod logical_device;
mod packed_buffers;
mod renderer;
mod suballoc;
mod surface;
mod swapchain;
mod transfer;
mod vertex;

pub use command_pool::CommandPool;
pub use descriptors::{DescriptorSetLayout, FrameDescriptors};
pub use frame_ring::{FrameBackend, FrameRing};
pub use frame_slot::{build_frame_resources, FrameSlot};
pub use graphics_pipeline::{Framebuffer, GraphicsPipeline, PipelineLayout, RenderPass};
pub use image_view::ImageView;
pub use instance::{DebugMessenger, Instance};
pub use logical_device::{LogicalDevice, QueueFamilyIndices, Queues};
pub use packed_buffers::PackedBuffers;
pub use renderer::Renderer;
pub use suballoc::{plan_layout, BufferRequest, PackedEntry, PackedLayout, SuballocError};
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainSupportDetails};
pub use transfer::{upload, GraphicsTransfer, TransferBackend};
pub use vertex::{QuadUniforms, Vertex, QUAD_INDICES, QUAD_VERTICES};

pub fn init_logging() -> Result<()> {
    set_up_color_terminal();
    let logger = SimpleLogger::new();
    logger.init()?;
    Ok(())
}

/// Create info shared by the persistent debug messenger and the instance
/// pNext chain, so instance creation/destruction is covered too.
pub fn get_debug_messenger_create_info() -> DebugUtilsMessengerCreateInfoEXT<'static> {
    DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | DebugUtilsMessageSeverityFlagsEXT::INFO
                | DebugUtilsMessageSeverityFlagsEXT::WARNING
                | DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            DebugUtilsMessageTypeFlagsEXT::GENERAL
                | DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_utils_callback))
}

pub unsafe extern "system" fn vulkan_debug_utils_callback(
    message_severity: DebugUtilsMessageSeverityFlagsEXT,
    message_type: DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> Bool32 {
    let message = format!("{:?}", CStr::from_ptr((*p_callback_data).p_message));
    let ty = format!("{:?}", message_type).to_lowercase();

    match message_severity {
        DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            event!(Level::TRACE, ty = %ty, "{message}")
        }
        DebugUtilsMessageSeverityFlagsEXT::INFO => {
            event!(Level::INFO, ty = %ty, "{message}")
        }
        DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            event!(Level::WARN, ty = %ty, "{message}")
        }
        DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            event!(Level::ERROR, ty = %ty, "{message}")
        }
        _ => panic!(
            "Unknown message severity in vulkan_debug_utils_callback! {:?}",
            message_severity
        ),
    }
    // dont skip driver
    ash::vk::FALSE
}
