use std::ptr::NonNull;
use std::sync::Arc;
use ash::vk;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::error::{RenderError, RenderResult};

/// A buffer bound to its own dedicated memory allocation.
///
/// Host-visible allocations stay mapped for the whole lifetime of the buffer.
pub struct BufferResource {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    memory: vk::DeviceMemory,
    mapped: Option<NonNull<u8>>,
    allocation_size: vk::DeviceSize,
    device: Arc<ash::Device>,
}

impl BufferResource {
    pub fn new(
        device: &RenderDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
        sharing_mode: vk::SharingMode,
    ) -> RenderResult<Self> {
        let logical = device.logical.clone();

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(sharing_mode);
        let buffer = unsafe { logical.create_buffer(&buffer_info, None) }
            .map_err(|e| allocation_failure("vkCreateBuffer", e))?;

        let reqs = unsafe { logical.get_buffer_memory_requirements(buffer) };
        let bound = bind_dedicated_memory(device, reqs, memory_flags, |memory| unsafe {
            logical.bind_buffer_memory(buffer, memory, 0)
        });
        let (memory, memory_type) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                unsafe { logical.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let host_visible = device
            .memory
            .property_flags(memory_type)
            .is_some_and(|flags| flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        let mapped = if host_visible {
            let ptr = unsafe {
                logical.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            };
            match ptr {
                Ok(ptr) => NonNull::new(ptr.cast::<u8>()),
                Err(e) => {
                    unsafe {
                        logical.destroy_buffer(buffer, None);
                        logical.free_memory(memory, None);
                    }
                    return Err(allocation_failure("vkMapMemory", e));
                }
            }
        } else {
            None
        };

        Ok(Self {
            buffer,
            size,
            memory,
            mapped,
            allocation_size: reqs.size,
            device: logical,
        })
    }

    /// Copies `data` into the mapped range starting `start_offset` bytes in
    pub fn write<T>(&mut self, data: &[T], start_offset: usize) -> RenderResult<presser::CopyRecord>
    where
        T: Copy,
    {
        let ptr = self.mapped.ok_or_else(|| {
            RenderError::InvalidWrite("buffer memory is not host visible".into())
        })?;

        let end = start_offset + std::mem::size_of_val(data);
        if end as u64 > self.size {
            return Err(RenderError::InvalidWrite(format!(
                "{} bytes at offset {} overflow a {} byte buffer",
                std::mem::size_of_val(data),
                start_offset,
                self.size,
            )));
        }

        let mut raw_allocation = unsafe {
            presser::RawAllocation::from_raw_parts(ptr, self.allocation_size as usize)
        };
        let mut slab = unsafe { raw_allocation.borrow_as_slab() };
        presser::copy_from_slice_to_offset(data, &mut slab, start_offset)
            .map_err(|e| RenderError::InvalidWrite(format!("{:?}", e)))
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Resolves a memory type for `reqs`, allocates exactly that much and binds it with `bind`.
///
/// Returns the memory and the chosen type index. Memory is freed again if binding fails.
pub fn bind_dedicated_memory<B>(
    device: &RenderDevice,
    reqs: vk::MemoryRequirements,
    memory_flags: vk::MemoryPropertyFlags,
    bind: B,
) -> RenderResult<(vk::DeviceMemory, u32)>
where
    B: FnOnce(vk::DeviceMemory) -> ash::prelude::VkResult<()>,
{
    let memory_type = device
        .memory
        .resolve_or_fallback(reqs.memory_type_bits, memory_flags)?;

    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(reqs.size)
        .memory_type_index(memory_type);
    let memory = unsafe { device.logical.allocate_memory(&allocate_info, None) }
        .map_err(|e| allocation_failure("vkAllocateMemory", e))?;

    if let Err(e) = bind(memory) {
        unsafe { device.logical.free_memory(memory, None) };
        return Err(allocation_failure("bind memory", e));
    }

    Ok((memory, memory_type))
}

fn allocation_failure(call: &str, e: vk::Result) -> RenderError {
    RenderError::ResourceAllocationFailure(format!("{} failed: {}", call, e))
}
