use std::{collections::HashSet, ops::Deref, rc::Rc};

use anyhow::Result;
use ash::{
    khr::swapchain,
    vk::{
        ColorSpaceKHR, CompositeAlphaFlagsKHR, Extent2D, Fence, Format, Image, ImageUsageFlags,
        PhysicalDevice, PresentInfoKHR, PresentModeKHR, Queue, Semaphore, SharingMode,
        SurfaceCapabilitiesKHR, SurfaceFormatKHR, SwapchainCreateInfoKHR, SwapchainKHR,
    },
};
use winit::window::Window;

use crate::{Instance, LogicalDevice, Surface};

/// Details about what features the swap chain supports for a given surface
pub struct SwapchainSupportDetails {
    pub capabilities: SurfaceCapabilitiesKHR,
    /// The formats (color depth settings) available to use.
    pub formats: Vec<SurfaceFormatKHR>,
    pub present_modes: Vec<PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(surface: &Surface, device: &PhysicalDevice) -> Result<Self> {
        let capabilities = surface.get_physical_device_surface_capabilities(device)?;
        let formats = surface.get_physical_device_surface_formats(device)?;
        let present_modes = surface.get_physical_device_surface_present_modes(device)?;
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Picks the preferential surface format to use from the available
    pub fn choose_swap_surface_format(&self) -> SurfaceFormatKHR {
        let srgb_color_space_formats = self
            .formats
            .iter()
            .filter(|format| format.color_space == ColorSpaceKHR::SRGB_NONLINEAR)
            .collect::<Vec<_>>();
        if let Some(b8g8r8a8_format) = srgb_color_space_formats
            .iter()
            .find(|format| format.format == Format::B8G8R8A8_SRGB)
        {
            **b8g8r8a8_format
        } else if let Some(srgb_format) = srgb_color_space_formats.first() {
            **srgb_format
        } else {
            self.formats[0]
        }
    }

    /// Picks the preferential present mode to use based on the available
    pub fn choose_swap_present_mode(&self) -> PresentModeKHR {
        // prefer mailbox, where if we can render faster than the screen can
        // present and the queue fills up, we'll replace the last image with
        // the most up to date version
        if self.present_modes.contains(&PresentModeKHR::MAILBOX) {
            return PresentModeKHR::MAILBOX;
        }
        // otherwise, use FIFO - basically vertical sync. This is the only
        // setting guaranteed to be available on all systems
        PresentModeKHR::FIFO
    }

    /// Returns the "extent" of the images to draw - the resolution to use *in pixels*.
    pub fn choose_swap_extent(&self, window: &Window) -> Extent2D {
        match self.capabilities.current_extent.width {
            // in this scenario, we're in a high DPI setting where extent is in
            // screen space, but we need it to be in pixels. set it to the same
            // size as the window
            u32::MAX => {
                let window_size = window.inner_size();
                Extent2D {
                    width: window_size.width.clamp(
                        self.capabilities.min_image_extent.width,
                        self.capabilities.max_image_extent.width,
                    ),
                    height: window_size.height.clamp(
                        self.capabilities.min_image_extent.height,
                        self.capabilities.max_image_extent.height,
                    ),
                }
            }
            _ => self.capabilities.current_extent,
        }
    }

    /// Returns how many images the swap chain should use based on its support.
    /// One more than the minimum so we're not stuck waiting on the driver,
    /// clamped when the surface reports a maximum (zero means unbounded).
    pub fn get_image_count(&self) -> u32 {
        let image_count = self.capabilities.min_image_count + 1;
        if self.capabilities.max_image_count > 0 {
            image_count.min(self.capabilities.max_image_count)
        } else {
            image_count
        }
    }
}

pub struct Swapchain {
    swapchain_fn: swapchain::Device,
    swapchain_ptr: SwapchainKHR,
    extent: Extent2D,
    surface_format: SurfaceFormatKHR,
    // references we need to keep to ensure
    // we are cleaned up before they are
    _instance: Rc<Instance>,
    _logical_device: Rc<LogicalDevice>,
}

impl Swapchain {
    pub fn new(
        instance: &Rc<Instance>,
        logical_device: &Rc<LogicalDevice>,
        window: &Window,
    ) -> Result<Self> {
        let queue_indices = logical_device.get_queue_family_indices();
        let queue_family_indices = Vec::from_iter(HashSet::from([
            queue_indices.graphics_family.unwrap(),
            queue_indices.present_family.unwrap(),
        ]));

        let swapchain_support = logical_device.get_swapchain_support_details()?;
        let surface_format = swapchain_support.choose_swap_surface_format();
        let present_mode = swapchain_support.choose_swap_present_mode();
        let extent = swapchain_support.choose_swap_extent(window);
        let image_count = swapchain_support.get_image_count();

        let mut swapchain_create_info = SwapchainCreateInfoKHR::default()
            .surface(**logical_device.get_surface())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .present_mode(present_mode)
            // always 1 unless doing sterioscopic 3D
            .image_array_layers(1)
            // use images as color attachments for drawing color pictures to
            .image_usage(ImageUsageFlags::COLOR_ATTACHMENT)
            // no transform
            .pre_transform(swapchain_support.capabilities.current_transform)
            // ignore alpha channel
            .composite_alpha(CompositeAlphaFlagsKHR::OPAQUE)
            // enable clipping, to discard pixels that aren't visible
            .clipped(true)
            .old_swapchain(SwapchainKHR::null());
        if queue_family_indices.len() == 1 {
            swapchain_create_info =
                swapchain_create_info.image_sharing_mode(SharingMode::EXCLUSIVE);
        } else {
            // images get used from both families without explicit ownership
            // transfers
            swapchain_create_info = swapchain_create_info
                .image_sharing_mode(SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices);
        }

        let swapchain_fn = swapchain::Device::new(instance, logical_device);
        let swapchain_ptr =
            unsafe { swapchain_fn.create_swapchain(&swapchain_create_info, None) }?;

        Ok(Self {
            swapchain_fn,
            swapchain_ptr,
            extent,
            surface_format,
            _instance: Rc::clone(instance),
            _logical_device: Rc::clone(logical_device),
        })
    }

    pub fn get_swapchain_images(&self) -> Result<Vec<Image>> {
        let images = unsafe { self.swapchain_fn.get_swapchain_images(self.swapchain_ptr)? };
        Ok(images)
    }

    /// Acquires the index of the next image to use from the swapchain, and
    /// registers the signal semaphore to be signaled when its ready for use.
    pub fn acquire_next_image_index(&self, signal_semaphore: &Semaphore) -> Result<u32> {
        let (index, _) = unsafe {
            self.swapchain_fn.acquire_next_image(
                self.swapchain_ptr,
                u64::MAX,
                *signal_semaphore,
                Fence::null(),
            )?
        };
        Ok(index)
    }

    pub fn queue_present(&self, queue: Queue, present_info: &PresentInfoKHR) -> Result<()> {
        unsafe { self.swapchain_fn.queue_present(queue, present_info)? };
        Ok(())
    }

    pub fn get_handle(&self) -> &SwapchainKHR {
        &self.swapchain_ptr
    }

    pub fn get_extent(&self) -> &Extent2D {
        &self.extent
    }

    pub fn get_surface_format(&self) -> &SurfaceFormatKHR {
        &self.surface_format
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.swapchain_fn
                .destroy_swapchain(self.swapchain_ptr, None)
        }
    }
}

impl Deref for Swapchain {
    type Target = swapchain::Device;

    fn deref(&self) -> &Self::Target {
        &self.swapchain_fn
    }
}
