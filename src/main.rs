use std::{ffi::CStr, process::ExitCode, rc::Rc};

use anyhow::{Context, Result};
use ash::Entry;
use tracing::{error, info};
use vulkan_quad::{
    init_logging, DebugMessenger, DescriptorSetLayout, Framebuffer, GraphicsPipeline, ImageView,
    Instance, LogicalDevice, PipelineLayout, RenderPass, Renderer, Surface, Swapchain,
};
use winit::{
    dpi::PhysicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    raw_window_handle::HasDisplayHandle,
    window::{Window, WindowBuilder, WindowButtons},
};

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;
const WINDOW_TITLE: &str = "Vulkan Quad";

/// How many frames may be recorded ahead of the GPU. The frame ring takes
/// this as a parameter; nothing else hardcodes it.
const FRAMES_IN_FLIGHT: usize = 2;

fn main() -> ExitCode {
    if let Err(error) = run() {
        error!("{error:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    init_logging()?;

    let event_loop = EventLoop::new()?;
    let app = App::new(&event_loop)?;
    app.run(event_loop)
}

struct App {
    /// Drives one frame per event-loop turn; owns all per-frame resources
    renderer: Renderer,
    /// Kept so the window-idle teardown can drain the device
    logical_device: Rc<LogicalDevice>,
    /// The actual window presented to the user. Need to keep a reference
    /// to this for the life of the app or it will get cleaned up
    _window: Window,
    /// The debug utils messenger, if validations are enabled
    _debug_messenger: Option<DebugMessenger>,
}

impl App {
    pub fn new(event_loop: &EventLoop<()>) -> Result<Self> {
        let required_extensions =
            ash_window::enumerate_required_extensions(event_loop.display_handle()?.as_raw())?
                .iter()
                .map(|extension| unsafe { CStr::from_ptr(*extension) }.to_str())
                .collect::<Result<Vec<_>, _>>()?;

        let window = Self::init_window(event_loop)?;

        // init vulkan
        let entry = unsafe { Entry::load() }.context("failed to load the Vulkan library")?;
        let instance = Rc::new(Instance::new(entry, required_extensions)?);
        let debug_messenger = DebugMessenger::new(&instance)?;
        let surface = Surface::new(&instance, &window)?;
        let logical_device = LogicalDevice::new(&instance, surface)?;
        let swapchain = Rc::new(Swapchain::new(&instance, &logical_device, &window)?);

        // configure the graphics pipeline
        let render_pass = Rc::new(RenderPass::new(&logical_device, &swapchain)?);
        let descriptor_set_layout = DescriptorSetLayout::new(&logical_device)?;
        let pipeline_layout = Rc::new(PipelineLayout::new(
            &logical_device,
            &descriptor_set_layout,
        )?);
        let pipeline = Rc::new(GraphicsPipeline::new(
            &logical_device,
            &render_pass,
            &pipeline_layout,
        )?);

        let surface_format = *swapchain.get_surface_format();
        let framebuffers = swapchain
            .get_swapchain_images()?
            .into_iter()
            .map(|image| {
                let image_view = ImageView::new(&logical_device, surface_format, image)?;
                Framebuffer::new(
                    &logical_device,
                    &render_pass,
                    swapchain.get_extent(),
                    image_view,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let renderer = Renderer::new(
            &logical_device,
            &swapchain,
            &render_pass,
            &pipeline_layout,
            &pipeline,
            &descriptor_set_layout,
            framebuffers,
            FRAMES_IN_FLIGHT,
        )?;

        Ok(Self {
            renderer,
            logical_device,
            _window: window,
            _debug_messenger: debug_messenger,
        })
    }

    pub fn run(mut self, event_loop: EventLoop<()>) -> Result<()> {
        let mut frame_error = None;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run(|event, elwt| match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                window_id: _,
            } => {
                elwt.exit();
            }
            Event::AboutToWait => {
                // a failed iteration leaves its slot mid-protocol; there is
                // no repair path, so stop the loop
                if let Err(error) = self.renderer.draw_frame() {
                    frame_error = Some(error);
                    elwt.exit();
                }
            }
            Event::LoopExiting => {
                info!("Window closed, shutting down");
                // drain the device before resources start dropping
                if let Err(error) = unsafe { self.logical_device.device_wait_idle() } {
                    error!("failed to drain the device on shutdown: {error}");
                }
            }
            _ => {}
        })?;

        match frame_error {
            Some(error) => Err(error.context("frame rendering failed")),
            None => Ok(()),
        }
    }

    /// Creates the window that will interact with the OS to draw the results on the screen
    fn init_window(event_loop: &EventLoop<()>) -> Result<Window> {
        let window = WindowBuilder::new()
            .with_inner_size(PhysicalSize::<u32>::from((WINDOW_WIDTH, WINDOW_HEIGHT)))
            .with_resizable(false)
            .with_enabled_buttons(WindowButtons::CLOSE)
            .with_active(true)
            .with_title(WINDOW_TITLE)
            .build(event_loop)?;
        Ok(window)
    }
}
