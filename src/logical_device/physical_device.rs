use std::{collections::HashSet, ffi::CStr};

use anyhow::{anyhow, Result};
use ash::vk::PhysicalDevice;

use crate::{Instance, Surface, SwapchainSupportDetails};

use super::queue_families::find_queue_families;

pub fn pick_physical_device(
    instance: &Instance,
    surface: &Surface,
    extension_names: &[&CStr],
) -> Result<PhysicalDevice> {
    fn device_supports_required_queues(
        instance: &Instance,
        surface: &Surface,
        physical_device: &PhysicalDevice,
    ) -> Result<bool> {
        let queue_families = find_queue_families(instance, physical_device, surface)?;
        Ok(queue_families.is_complete())
    }

    fn device_supports_required_extensions(
        instance: &Instance,
        physical_device: &PhysicalDevice,
        extension_names: &[&CStr],
    ) -> Result<bool> {
        let extensions =
            unsafe { instance.enumerate_device_extension_properties(*physical_device) }?;
        let mut available_extension_names = HashSet::new();
        for extension in extensions {
            available_extension_names.insert(extension.extension_name_as_c_str()?.to_owned());
        }

        Ok(extension_names
            .iter()
            .all(|extension_name| available_extension_names.contains(*extension_name)))
    }

    fn device_supports_swapchain(surface: &Surface, device: &PhysicalDevice) -> Result<bool> {
        let swapchain_support_details = SwapchainSupportDetails::query(surface, device)?;
        Ok(!swapchain_support_details.formats.is_empty()
            && !swapchain_support_details.present_modes.is_empty())
    }

    let physical_devices = unsafe { instance.enumerate_physical_devices() }?;
    for physical_device in physical_devices {
        if device_supports_required_queues(instance, surface, &physical_device)?
            && device_supports_required_extensions(instance, &physical_device, extension_names)?
            && device_supports_swapchain(surface, &physical_device)?
        {
            return Ok(physical_device);
        }
    }
    Err(anyhow!("no suitable graphics cards found!"))
}
