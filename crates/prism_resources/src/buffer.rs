//! GPU buffer proxies.
//!
//! A proxy owns the CPU-side bookkeeping for one device buffer: its id, the
//! allocated capacity and how many elements the last upload carried. Device
//! buffers are created through [`GraphicsDevice`] and written through the
//! render thread's [`DeviceContext`].
//!
//! - [`ImmutableBufferProxy`]: created once with its contents (mesh geometry).
//! - [`DynamicBufferProxy`]: rewritten every time, grows to the next power of
//!   two when an upload does not fit. Also backs structured buffers.
//! - [`ConstantBufferProxy`]: fixed-size constants with a dirty flag.

use bytemuck::Pod;
use prism_core::Result;

use crate::device::{BufferDesc, BufferId, BufferUsage, DeviceContext, GraphicsDevice};

// ============================================================================
// Immutable
// ============================================================================

#[derive(Debug)]
pub struct ImmutableBufferProxy {
    buffer: Option<BufferId>,
    element_count: u32,
    stride: u32,
}

impl ImmutableBufferProxy {
    pub fn create<T: Pod>(
        device: &dyn GraphicsDevice,
        label: &str,
        usage: BufferUsage,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let stride = size_of::<T>() as u32;
        let desc = BufferDesc {
            label: label.to_string(),
            size: bytes.len() as u64,
            stride,
            usage,
        };
        let buffer = device.create_buffer(&desc, Some(bytes))?;
        Ok(Self {
            buffer: Some(buffer),
            element_count: data.len() as u32,
            stride,
        })
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    #[inline]
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn dispose(&mut self, device: &dyn GraphicsDevice) {
        if let Some(id) = self.buffer.take() {
            device.destroy_buffer(id);
        }
        self.element_count = 0;
    }
}

// ============================================================================
// Dynamic / Structured
// ============================================================================

#[derive(Debug)]
pub struct DynamicBufferProxy {
    label: String,
    usage: BufferUsage,
    buffer: Option<BufferId>,
    capacity: u64,
    element_count: u32,
}

impl DynamicBufferProxy {
    #[must_use]
    pub fn new(label: impl Into<String>, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            usage: usage | BufferUsage::DYNAMIC,
            buffer: None,
            capacity: 0,
            element_count: 0,
        }
    }

    /// Structured (storage) buffer variant, e.g. per-instance data.
    #[must_use]
    pub fn structured(label: impl Into<String>) -> Self {
        Self::new(label, BufferUsage::STRUCTURED)
    }

    /// Uploads `data`, recreating the device buffer when it does not fit.
    ///
    /// An empty slice keeps the current allocation and records zero elements.
    pub fn upload<T: Pod>(
        &mut self,
        device: &dyn GraphicsDevice,
        dc: &mut dyn DeviceContext,
        data: &[T],
    ) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            self.element_count = 0;
            return Ok(());
        }

        let needed = bytes.len() as u64;
        let id = match self.buffer {
            Some(id) if needed <= self.capacity => id,
            _ => {
                let capacity = needed.next_power_of_two();
                if let Some(old) = self.buffer.take() {
                    log::debug!(
                        "Growing buffer '{}': {} -> {} bytes",
                        self.label,
                        self.capacity,
                        capacity
                    );
                    device.destroy_buffer(old);
                }
                let desc = BufferDesc {
                    label: self.label.clone(),
                    size: capacity,
                    stride: size_of::<T>() as u32,
                    usage: self.usage,
                };
                let id = device.create_buffer(&desc, None)?;
                self.buffer = Some(id);
                self.capacity = capacity;
                id
            }
        };

        dc.write_buffer(id, 0, bytes)?;
        self.element_count = data.len() as u32;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn dispose(&mut self, device: &dyn GraphicsDevice) {
        if let Some(id) = self.buffer.take() {
            device.destroy_buffer(id);
        }
        self.capacity = 0;
        self.element_count = 0;
    }
}

// ============================================================================
// Constant
// ============================================================================

/// Fixed-size constant buffer with a CPU shadow copy.
#[derive(Debug)]
pub struct ConstantBufferProxy {
    buffer: BufferId,
    data: Vec<u8>,
    dirty: bool,
}

impl ConstantBufferProxy {
    pub fn create(device: &dyn GraphicsDevice, label: &str, size: u64) -> Result<Self> {
        let desc = BufferDesc {
            label: label.to_string(),
            size,
            stride: 0,
            usage: BufferUsage::CONSTANT | BufferUsage::DYNAMIC,
        };
        let buffer = device.create_buffer(&desc, None)?;
        Ok(Self {
            buffer,
            data: vec![0; size as usize],
            dirty: true,
        })
    }

    /// Copies `value` into the shadow copy at `offset`. Out-of-range writes are
    /// truncated to the buffer size.
    pub fn write<T: Pod>(&mut self, offset: usize, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        let end = (offset + bytes.len()).min(self.data.len());
        if offset >= end {
            return;
        }
        let dst = &mut self.data[offset..end];
        let src = &bytes[..dst.len()];
        if dst != src {
            dst.copy_from_slice(src);
            self.dirty = true;
        }
    }

    /// Uploads the shadow copy if it changed since the last flush.
    pub fn flush(&mut self, dc: &mut dyn DeviceContext) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        dc.write_buffer(self.buffer, 0, &self.data)?;
        self.dirty = false;
        Ok(true)
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn dispose(self, device: &dyn GraphicsDevice) {
        device.destroy_buffer(self.buffer);
    }
}
