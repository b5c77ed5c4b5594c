mod physical_device;
mod queue_families;

use std::{collections::HashSet, ops::Deref, rc::Rc};

use anyhow::{ensure, Result};
use ash::{
    vk::{
        DeviceCreateInfo, DeviceQueueCreateInfo, PhysicalDevice, PhysicalDeviceFeatures,
        PhysicalDeviceMemoryProperties, Queue, KHR_SWAPCHAIN_NAME,
    },
    Device,
};
use tracing::debug;

use crate::{Instance, Surface, SwapchainSupportDetails};

use self::physical_device::pick_physical_device;
pub use self::queue_families::QueueFamilyIndices;
use self::queue_families::find_queue_families;

/// Handles to the queues for submitting instructions to. Graphics and
/// present may alias the same underlying queue when one family serves
/// both; they are still looked up separately.
pub struct Queues {
    pub graphics: Queue,
    pub present: Queue,
}

/// The logical device for interfacing with the physical hardware. Owns the
/// surface it was selected against, the queue handles, and the physical
/// device memory property table the allocator classifies against.
pub struct LogicalDevice {
    device: Device,
    queues: Queues,
    queue_family_indices: QueueFamilyIndices,
    memory_properties: PhysicalDeviceMemoryProperties,
    physical_device: PhysicalDevice,
    surface: Surface,
    // reference to make sure the instance outlives the device
    _instance: Rc<Instance>,
}

impl LogicalDevice {
    /// Selects a suitable physical device and creates the logical device on
    /// top of it, with one queue per relevant queue family.
    pub fn new(instance: &Rc<Instance>, surface: Surface) -> Result<Rc<Self>> {
        let required_extension_names = [KHR_SWAPCHAIN_NAME];

        let physical_device =
            pick_physical_device(instance, &surface, &required_extension_names)?;
        let queue_family_indices = find_queue_families(instance, &physical_device, &surface)?;
        ensure!(
            queue_family_indices.is_complete(),
            "selected physical device is missing required queue families"
        );

        let unique_queue_family_indices = HashSet::from([
            queue_family_indices.graphics_family.unwrap(),
            queue_family_indices.present_family.unwrap(),
        ]);

        let queue_priorities = [1.0f32];
        let device_queue_create_infos = unique_queue_family_indices
            .into_iter()
            .map(|queue_family_index| {
                DeviceQueueCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let physical_device_features = PhysicalDeviceFeatures::default();
        let extension_name_ptrs = required_extension_names
            .iter()
            .map(|extension_name| extension_name.as_ptr())
            .collect::<Vec<_>>();

        let device_create_info = DeviceCreateInfo::default()
            .queue_create_infos(&device_queue_create_infos)
            .enabled_features(&physical_device_features)
            .enabled_extension_names(&extension_name_ptrs);

        let device =
            unsafe { instance.create_device(physical_device, &device_create_info, None) }?;
        debug!("Logical device created");

        // both queues are looked up explicitly; when the families match the
        // two handles alias the same queue
        let graphics = unsafe {
            device.get_device_queue(queue_family_indices.graphics_family.unwrap(), 0)
        };
        let present = unsafe {
            device.get_device_queue(queue_family_indices.present_family.unwrap(), 0)
        };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok(Rc::new(Self {
            device,
            queues: Queues { graphics, present },
            queue_family_indices,
            memory_properties,
            physical_device,
            surface,
            _instance: Rc::clone(instance),
        }))
    }

    pub fn get_queues(&self) -> &Queues {
        &self.queues
    }

    pub fn get_queue_family_indices(&self) -> &QueueFamilyIndices {
        &self.queue_family_indices
    }

    /// The memory property table of the backing physical device. Read-only
    /// input to memory-type classification, never used to create anything.
    pub fn get_memory_properties(&self) -> &PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn get_surface(&self) -> &Surface {
        &self.surface
    }

    pub fn get_swapchain_support_details(&self) -> Result<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(&self.surface, &self.physical_device)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) }
    }
}

impl Deref for LogicalDevice {
    type Target = Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
