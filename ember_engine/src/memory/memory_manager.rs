/// MemoryManager - device memory allocation, binding and mapping
///
/// Every allocation is tracked in a slot map; the caller receives an owning
/// `MemoryBlock` that must be handed back to `free`. Blocks are neither
/// `Clone` nor `Copy`, so a block cannot be freed twice or used after free.
///
/// Memory types are picked first-fit: the lowest index whose property flags
/// contain every requested flag and which the resource accepts.

use std::sync::Arc;
use ash::vk;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::device::Device;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::{engine_trace, engine_warn};

new_key_type! {
    /// Non-owning key into the allocation table
    pub struct AllocationKey;
}

/// Resource a block was allocated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResource {
    Buffer(vk::Buffer),
    Image(vk::Image),
    /// Shared block; callers bind resources at sub-offsets themselves
    None,
}

#[derive(Debug)]
struct AllocationRecord {
    memory: vk::DeviceMemory,
    resource: BoundResource,
    size: u64,
    memory_type: u32,
}

/// Owning handle to a device memory allocation
#[derive(Debug)]
pub struct MemoryBlock {
    key: AllocationKey,
    resource: BoundResource,
    memory: vk::DeviceMemory,
    size: u64,
}

impl MemoryBlock {
    pub fn key(&self) -> AllocationKey { self.key }
    pub fn resource(&self) -> BoundResource { self.resource }
    pub fn memory(&self) -> vk::DeviceMemory { self.memory }
    pub fn size(&self) -> u64 { self.size }

    /// Buffer owned by this block, if any
    pub fn buffer(&self) -> Option<vk::Buffer> {
        match self.resource {
            BoundResource::Buffer(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// Device memory allocator
pub struct MemoryManager {
    device: Arc<dyn Device>,
    memory_types: Vec<vk::MemoryPropertyFlags>,
    allocations: SlotMap<AllocationKey, AllocationRecord>,
    /// (type bits, property flags) -> memory type index
    type_cache: FxHashMap<(u32, vk::MemoryPropertyFlags), u32>,
}

impl MemoryManager {
    pub fn new(device: Arc<dyn Device>) -> Self {
        let memory_types = device.memory_types();
        Self {
            device,
            memory_types,
            allocations: SlotMap::with_key(),
            type_cache: FxHashMap::default(),
        }
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// First memory type accepted by `type_bits` whose flags contain `required`
    pub fn find_memory_type(&mut self, type_bits: u32, required: vk::MemoryPropertyFlags) -> Result<u32> {
        if let Some(&index) = self.type_cache.get(&(type_bits, required)) {
            return Ok(index);
        }

        let found = self.memory_types
            .iter()
            .enumerate()
            .find(|(index, flags)| type_bits & (1 << index) != 0 && flags.contains(required))
            .map(|(index, _)| index as u32);

        match found {
            Some(index) => {
                self.type_cache.insert((type_bits, required), index);
                Ok(index)
            }
            None => Err(Engine::log_and_return_error(
                "ember::MemoryManager",
                Error::NoSuitableMemoryType { required: format!("{:?}", required), type_bits },
            )),
        }
    }

    /// Allocate memory for a buffer or image and bind it at offset 0
    pub fn allocate(&mut self, resource: BoundResource, required: vk::MemoryPropertyFlags) -> Result<MemoryBlock> {
        let requirements = match resource {
            BoundResource::Buffer(buffer) => self.device.buffer_memory_requirements(buffer),
            BoundResource::Image(image) => self.device.image_memory_requirements(image),
            BoundResource::None => {
                return Err(Error::InvalidResource(
                    "allocate() needs a resource, use allocate_shared() for shared blocks".to_string(),
                ));
            }
        };

        let memory_type = self.find_memory_type(requirements.memory_type_bits, required)?;
        let memory = self.device.allocate_memory(requirements.size, memory_type)?;

        let bound = match resource {
            BoundResource::Buffer(buffer) => self.device.bind_buffer_memory(buffer, memory, 0),
            BoundResource::Image(image) => self.device.bind_image_memory(image, memory, 0),
            BoundResource::None => Ok(()),
        };
        if let Err(e) = bound {
            self.device.free_memory(memory);
            return Err(e);
        }

        Ok(self.insert(memory, resource, requirements.size, memory_type))
    }

    /// Allocate a block that several resources will share at caller-chosen offsets
    pub fn allocate_shared(&mut self, size: u64, type_bits: u32, required: vk::MemoryPropertyFlags) -> Result<MemoryBlock> {
        let memory_type = self.find_memory_type(type_bits, required)?;
        let memory = self.device.allocate_memory(size, memory_type)?;
        Ok(self.insert(memory, BoundResource::None, size, memory_type))
    }

    fn insert(&mut self, memory: vk::DeviceMemory, resource: BoundResource, size: u64, memory_type: u32) -> MemoryBlock {
        let key = self.allocations.insert(AllocationRecord { memory, resource, size, memory_type });
        engine_trace!("ember::MemoryManager",
            "Allocated {} bytes (type {}) for {:?}", size, memory_type, resource);
        MemoryBlock { key, resource, memory, size }
    }

    /// Destroy the owned resource (if any) and release the memory
    pub fn free(&mut self, block: MemoryBlock) {
        match self.allocations.remove(block.key) {
            Some(record) => self.release(record),
            None => engine_warn!("ember::MemoryManager",
                "Block {:?} is not tracked by this manager", block.key),
        }
    }

    fn release(&self, record: AllocationRecord) {
        match record.resource {
            BoundResource::Buffer(buffer) => self.device.destroy_buffer(buffer),
            BoundResource::Image(image) => self.device.destroy_image(image),
            BoundResource::None => {}
        }
        self.device.free_memory(record.memory);
    }

    /// Map `len` bytes of a host-visible block starting at `offset`
    ///
    /// The mapping is released when the returned guard is dropped.
    pub fn map(&self, block: &MemoryBlock, offset: u64, len: u64) -> Result<MappedMemory<'_>> {
        if offset + len > block.size {
            return Err(Error::InvalidResource(format!(
                "Mapping [{}, {}) exceeds block size {}", offset, offset + len, block.size
            )));
        }
        let ptr = self.device.map_memory(block.memory, offset, len)?;
        Ok(MappedMemory {
            device: self.device.as_ref(),
            memory: block.memory,
            ptr,
            len: len as usize,
        })
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        if !self.allocations.is_empty() {
            engine_warn!("ember::MemoryManager",
                "{} allocation(s) still alive at shutdown, releasing them", self.allocations.len());
        }
        let leftovers: Vec<AllocationRecord> = self.allocations.drain().map(|(_, record)| record).collect();
        for record in leftovers {
            self.release(record);
        }
    }
}

// ===== SCOPED MAPPING =====

/// A live host mapping; unmapped on drop
pub struct MappedMemory<'a> {
    device: &'a dyn Device,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
}

impl MappedMemory<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `data` at `offset` (relative to the mapping start)
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len()).filter(|&end| end <= self.len);
        if end.is_none() {
            return Err(Error::InvalidResource(format!(
                "Write of {} bytes at {} overflows a {}-byte mapping", data.len(), offset, self.len
            )));
        }
        // SAFETY: `ptr` maps `len` bytes and the range was checked above
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        }
        Ok(())
    }

    /// Fill the whole mapping with `value`
    pub fn fill(&mut self, value: u8) {
        // SAFETY: `ptr` maps `len` bytes
        unsafe {
            std::ptr::write_bytes(self.ptr, value, self.len);
        }
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        self.device.unmap_memory(self.memory);
    }
}

#[cfg(test)]
#[path = "memory_manager_tests.rs"]
mod tests;
