use anyhow::Result;
use ash::vk::{PhysicalDevice, QueueFlags};

use crate::{Instance, Surface};

#[derive(Debug)]
pub struct QueueFamilyIndices {
    /// family capable of running graphics related commands
    pub graphics_family: Option<u32>,
    /// family capable of displaying results on the screen
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True if all queue families are available for this physical device.
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }
}

pub fn find_queue_families(
    instance: &Instance,
    device: &PhysicalDevice,
    surface: &Surface,
) -> Result<QueueFamilyIndices> {
    let queue_family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(*device) };

    let graphics_family = queue_family_properties
        .iter()
        .position(|queue_family_props| queue_family_props.queue_flags.contains(QueueFlags::GRAPHICS))
        .map(|index| index as u32);

    let mut present_family = None;
    for index in 0..queue_family_properties.len() as u32 {
        let supports_present = surface.get_physical_device_surface_support(device, index)?;
        if supports_present {
            present_family = Some(index);
            break;
        }
    }

    Ok(QueueFamilyIndices {
        graphics_family,
        present_family,
    })
}
