use ash::vk::{DeviceSize, MemoryPropertyFlags, PhysicalDeviceMemoryProperties};
use thiserror::Error;
use tracing::debug;

/// Reasons a packed layout cannot be planned. Raised before any device
/// allocation call is made, so a failed plan leaves nothing to clean up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SuballocError {
    #[error("no buffers were requested")]
    NoBuffers,
    #[error("requested buffers share no compatible memory type")]
    NoSharedMemoryType,
    #[error("no shared memory type has the properties {0:?}")]
    NoMatchingMemoryType(MemoryPropertyFlags),
}

/// The memory requirements of one logical buffer, as reported by the
/// device for the created (but not yet bound) buffer handle.
#[derive(Debug, Clone, Copy)]
pub struct BufferRequest {
    pub size: DeviceSize,
    /// Required offset alignment. Always a power of two.
    pub alignment: DeviceSize,
    /// Bitmask of memory type indices this buffer may be bound to.
    pub memory_type_bits: u32,
}

/// Where one buffer lands inside the shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedEntry {
    /// Index of the originating request, so callers can bind and address
    /// buffers in the order they asked for them.
    pub request: usize,
    pub offset: DeviceSize,
    pub size: DeviceSize,
    pub alignment: DeviceSize,
}

/// A packed layout for a group of buffers sharing one allocation. Entries
/// are ordered largest-alignment first; `offset % alignment == 0` holds for
/// every entry and entries never overlap.
#[derive(Debug, Clone)]
pub struct PackedLayout {
    pub entries: Vec<PackedEntry>,
    pub total_size: DeviceSize,
    /// The single memory type every buffer in the group is bound from.
    pub memory_type_index: u32,
}

impl PackedLayout {
    /// Offset of the buffer created from request `request`.
    pub fn offset_of(&self, request: usize) -> DeviceSize {
        self.entries
            .iter()
            .find(|entry| entry.request == request)
            .map(|entry| entry.offset)
            .expect("request index out of range for this layout")
    }
}

pub(crate) const fn align_up(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    // alignment is a power of two per the Vulkan spec
    (value + alignment - 1) & !(alignment - 1)
}

/// Plans one allocation holding every requested buffer.
///
/// All buffers must share at least one compatible memory type - the group is
/// bound from a single allocation, so an empty intersection is a hard error,
/// not a fallback point. Among the shared types, the lowest-index one that
/// carries `required_properties` wins. Buffers are then packed in decreasing
/// alignment order (ties broken by decreasing size) to minimize padding.
pub fn plan_layout(
    requests: &[BufferRequest],
    memory_properties: &PhysicalDeviceMemoryProperties,
    required_properties: MemoryPropertyFlags,
) -> Result<PackedLayout, SuballocError> {
    if requests.is_empty() {
        return Err(SuballocError::NoBuffers);
    }

    let shared_type_bits = requests
        .iter()
        .fold(u32::MAX, |bits, request| bits & request.memory_type_bits);
    if shared_type_bits == 0 {
        return Err(SuballocError::NoSharedMemoryType);
    }

    let memory_types =
        &memory_properties.memory_types[..memory_properties.memory_type_count as usize];
    let memory_type_index = memory_types
        .iter()
        .enumerate()
        .position(|(index, memory_type)| {
            shared_type_bits & (1 << index) != 0
                && memory_type.property_flags.contains(required_properties)
        })
        .ok_or(SuballocError::NoMatchingMemoryType(required_properties))?
        as u32;

    let mut order = (0..requests.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| {
        requests[b]
            .alignment
            .cmp(&requests[a].alignment)
            .then(requests[b].size.cmp(&requests[a].size))
    });

    let mut entries = Vec::with_capacity(requests.len());
    let mut cursor = 0;
    for request in order {
        let BufferRequest { size, alignment, .. } = requests[request];
        let offset = align_up(cursor, alignment);
        entries.push(PackedEntry {
            request,
            offset,
            size,
            alignment,
        });
        cursor = offset + size;
    }

    debug!(
        "Packed {} buffers into {} bytes of memory type {}",
        entries.len(),
        cursor,
        memory_type_index
    );

    Ok(PackedLayout {
        entries,
        total_size: cursor,
        memory_type_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::MemoryType;

    fn memory_properties(type_flags: &[MemoryPropertyFlags]) -> PhysicalDeviceMemoryProperties {
        let mut properties = PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = type_flags.len() as u32;
        for (index, flags) in type_flags.iter().enumerate() {
            properties.memory_types[index] = MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        properties
    }

    fn device_local_properties() -> PhysicalDeviceMemoryProperties {
        memory_properties(&[MemoryPropertyFlags::DEVICE_LOCAL])
    }

    fn request(size: DeviceSize, alignment: DeviceSize) -> BufferRequest {
        BufferRequest {
            size,
            alignment,
            memory_type_bits: u32::MAX,
        }
    }

    #[test]
    fn offsets_are_aligned_and_disjoint() {
        let requests = [
            request(100, 16),
            request(3, 1),
            request(7, 256),
            request(64, 64),
            request(1, 4),
        ];
        let layout = plan_layout(
            &requests,
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();

        let mut previous_end = 0;
        for entry in &layout.entries {
            assert_eq!(entry.offset % entry.alignment, 0);
            assert!(entry.offset >= previous_end);
            previous_end = entry.offset + entry.size;
        }
        assert_eq!(layout.total_size, previous_end);
    }

    #[test]
    fn single_buffer_lands_at_offset_zero() {
        let layout = plan_layout(
            &[request(12, 256)],
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();

        assert_eq!(layout.entries.len(), 1);
        assert_eq!(layout.entries[0].offset, 0);
        assert_eq!(layout.total_size, 12);
    }

    #[test]
    fn packs_in_decreasing_alignment_order() {
        // input order 256, 4, 64 must come out as 256, 64, 4
        let requests = [request(12, 256), request(4, 4), request(20, 64)];
        let layout = plan_layout(
            &requests,
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();

        let alignments = layout
            .entries
            .iter()
            .map(|entry| entry.alignment)
            .collect::<Vec<_>>();
        assert_eq!(alignments, vec![256, 64, 4]);
        assert_eq!(
            layout.entries.iter().map(|e| e.request).collect::<Vec<_>>(),
            vec![0, 2, 1]
        );

        // 12 bytes at 0, 20 bytes rounded up to 64, 4 bytes right after
        assert_eq!(layout.entries[1].offset, 64);
        assert_eq!(layout.entries[2].offset, 84);
        let last = layout.entries.last().unwrap();
        assert_eq!(layout.total_size, last.offset + last.size);
    }

    #[test]
    fn alignment_ties_break_by_decreasing_size() {
        let requests = [request(8, 16), request(32, 16)];
        let layout = plan_layout(
            &requests,
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();

        assert_eq!(
            layout.entries.iter().map(|e| e.request).collect::<Vec<_>>(),
            vec![1, 0]
        );
    }

    #[test]
    fn disjoint_type_bits_are_rejected() {
        let requests = [
            BufferRequest {
                size: 16,
                alignment: 4,
                memory_type_bits: 0b01,
            },
            BufferRequest {
                size: 16,
                alignment: 4,
                memory_type_bits: 0b10,
            },
        ];
        let result = plan_layout(
            &requests,
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert_eq!(result.unwrap_err(), SuballocError::NoSharedMemoryType);
    }

    #[test]
    fn missing_required_properties_are_rejected() {
        let properties = memory_properties(&[
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let result = plan_layout(
            &[request(16, 4)],
            &properties,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(
            result.unwrap_err(),
            SuballocError::NoMatchingMemoryType(
                MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT
            )
        );
    }

    #[test]
    fn lowest_matching_type_index_wins() {
        let properties = memory_properties(&[
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let layout = plan_layout(
            &[request(16, 4)],
            &properties,
            MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();
        assert_eq!(layout.memory_type_index, 1);
    }

    #[test]
    fn type_selection_respects_the_shared_bitmask() {
        let properties = memory_properties(&[
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        // type 0 matches the properties but is excluded by the bitmask
        let requests = [BufferRequest {
            size: 16,
            alignment: 4,
            memory_type_bits: 0b10,
        }];
        let layout = plan_layout(&requests, &properties, MemoryPropertyFlags::DEVICE_LOCAL)
            .unwrap();
        assert_eq!(layout.memory_type_index, 1);
    }

    #[test]
    fn empty_request_list_is_rejected() {
        let result = plan_layout(
            &[],
            &device_local_properties(),
            MemoryPropertyFlags::DEVICE_LOCAL,
        );
        assert_eq!(result.unwrap_err(), SuballocError::NoBuffers);
    }
}
