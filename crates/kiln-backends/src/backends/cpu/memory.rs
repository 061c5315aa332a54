//! Memory manager for the CPU backend
//!
//! Device buffers are plain heap allocations keyed by handle id.

use crate::backend::BufferHandle;
use crate::error::{BackendError, Result};
use std::collections::HashMap;

/// Memory manager for the CPU backend
pub struct MemoryManager {
    /// Buffer storage
    buffers: HashMap<u64, Vec<u8>>,

    /// Next buffer handle ID
    next_buffer_id: u64,
}

impl MemoryManager {
    /// Create a new memory manager
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            // Start at 1 so handle 0 is never valid
            next_buffer_id: 1,
        }
    }

    pub fn allocate_buffer(&mut self, size: usize) -> Result<BufferHandle> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, vec![0u8; size]);
        tracing::trace!(handle = id, bytes = size, "buffer_allocated");
        Ok(BufferHandle::new(id))
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        self.buffers
            .remove(&handle.id())
            .map(|_| ())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    pub fn resize_buffer(&mut self, handle: BufferHandle, size: usize) -> Result<()> {
        self.buffer_mut(handle)?.resize(size, 0);
        Ok(())
    }

    pub fn copy_to_buffer(&mut self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let buffer = self.buffer_mut(handle)?;
        if data.len() > buffer.len() {
            return Err(BackendError::BufferOutOfBounds {
                size: data.len(),
                buffer_size: buffer.len(),
            });
        }
        buffer[..data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn copy_from_buffer(&self, handle: BufferHandle, data: &mut [u8]) -> Result<()> {
        let buffer = self.buffer(handle)?;
        if data.len() > buffer.len() {
            return Err(BackendError::BufferOutOfBounds {
                size: data.len(),
                buffer_size: buffer.len(),
            });
        }
        data.copy_from_slice(&buffer[..data.len()]);
        Ok(())
    }

    pub fn buffer_size(&self, handle: BufferHandle) -> Result<usize> {
        self.buffer(handle).map(|buffer| buffer.len())
    }

    /// Borrow a buffer's contents
    pub fn buffer(&self, handle: BufferHandle) -> Result<&[u8]> {
        self.buffers
            .get(&handle.id())
            .map(Vec::as_slice)
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut Vec<u8>> {
        self.buffers
            .get_mut(&handle.id())
            .ok_or(BackendError::InvalidBufferHandle(handle.id()))
    }

    /// Replace a buffer's contents (and size) wholesale
    pub fn replace_buffer(&mut self, handle: BufferHandle, contents: Vec<u8>) -> Result<()> {
        *self.buffer_mut(handle)? = contents;
        Ok(())
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Total bytes held by live buffers
    pub fn total_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(16).unwrap();
        assert_eq!(handle.id(), 1);
        assert_eq!(memory.buffer_size(handle).unwrap(), 16);
        assert_eq!(memory.total_bytes(), 16);

        memory.free_buffer(handle).unwrap();
        assert_eq!(memory.buffer_count(), 0);
        assert!(matches!(
            memory.free_buffer(handle),
            Err(BackendError::InvalidBufferHandle(1))
        ));
    }

    #[test]
    fn test_copy_bounds() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(4).unwrap();

        memory.copy_to_buffer(handle, &[1, 2, 3, 4]).unwrap();
        let err = memory.copy_to_buffer(handle, &[0; 8]).unwrap_err();
        assert!(matches!(err, BackendError::BufferOutOfBounds { size: 8, buffer_size: 4 }));

        let mut out = [0u8; 2];
        memory.copy_from_buffer(handle, &mut out).unwrap();
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn test_resize_and_replace() {
        let mut memory = MemoryManager::new();
        let handle = memory.allocate_buffer(2).unwrap();
        memory.copy_to_buffer(handle, &[7, 7]).unwrap();

        memory.resize_buffer(handle, 4).unwrap();
        assert_eq!(memory.buffer(handle).unwrap(), &[7, 7, 0, 0]);

        memory.replace_buffer(handle, vec![9; 12]).unwrap();
        assert_eq!(memory.buffer_size(handle).unwrap(), 12);
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut memory = MemoryManager::new();
        let first = memory.allocate_buffer(1).unwrap();
        memory.free_buffer(first).unwrap();
        let second = memory.allocate_buffer(1).unwrap();
        assert_ne!(first, second);
        assert!(memory.buffer(first).is_err());
    }
}
