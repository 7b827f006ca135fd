use bytemuck::NoUninit;

use crate::{Device, DeviceError, TensorDType};

use std::alloc::Layout;

#[derive(Debug, PartialEq, Eq)]
pub struct RawCPUBuffer(*mut u8, Layout);

impl RawCPUBuffer {
    pub fn n_bytes(&self) -> usize {
        self.1.size()
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.0, self.1.size()) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.0, self.1.size()) }
    }

    /// Allocates `size` zeroed bytes aligned to `alignment`.
    ///
    /// Zero sized buffers never touch the allocator, they hold a dangling aligned pointer.
    pub fn zeroed(size: usize, alignment: usize) -> Result<Self, DeviceError> {
        let layout = Layout::from_size_align(size, alignment)
            .map_err(|_| DeviceError::AllocationFailed(size, Device::CPU))?;
        let data = if size == 0 {
            layout.align() as *mut u8
        } else {
            let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
            if ptr.is_null() {
                return Err(DeviceError::AllocationFailed(size, Device::CPU));
            }
            ptr
        };
        log::trace!("Allocated {} bytes at {:p}", size, data);
        Ok(Self(data, layout))
    }
}

impl Drop for RawCPUBuffer {
    fn drop(&mut self) {
        if self.1.size() > 0 {
            log::trace!("Releasing {} bytes at {:p}", self.1.size(), self.0);
            unsafe { std::alloc::dealloc(self.0, self.1) }
        }
    }
}

/// Managed CPU buffer
#[derive(Debug, derive_new::new)]
pub struct CPUBuffer {
    inner: RawCPUBuffer,
}

unsafe impl Send for CPUBuffer {}
unsafe impl Sync for CPUBuffer {}

impl CPUBuffer {
    pub fn zeroed(n_bytes: usize, alignment: usize) -> Result<Self, DeviceError> {
        Ok(Self::from(RawCPUBuffer::zeroed(n_bytes, alignment)?))
    }

    pub fn from_slice<T: NoUninit>(data: &[T]) -> Result<Self, DeviceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        Self::from_bytes(bytes, std::mem::align_of::<T>())
    }

    pub fn from_bytes(bytes: &[u8], alignment: usize) -> Result<Self, DeviceError> {
        let mut raw = RawCPUBuffer::zeroed(bytes.len(), alignment)?;
        raw.as_bytes_mut().copy_from_slice(bytes);
        Ok(Self::from(raw))
    }

    pub fn n_bytes(&self) -> usize {
        self.inner.n_bytes()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.inner.as_bytes_mut()
    }

    /// Reinterprets the whole buffer as elements of `T`.
    pub fn as_slice<T: TensorDType>(&self) -> &[T] {
        bytemuck::cast_slice(self.as_bytes())
    }

    pub fn as_slice_mut<T: TensorDType>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }
}

impl From<RawCPUBuffer> for CPUBuffer {
    fn from(raw: RawCPUBuffer) -> Self {
        CPUBuffer { inner: raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_is_zero() {
        let buf = CPUBuffer::zeroed(16, 4).unwrap();
        assert_eq!(buf.as_slice::<f32>(), &[0.0; 4]);
    }

    #[test]
    fn zero_sized_buffer() {
        let buf = CPUBuffer::zeroed(0, 8).unwrap();
        assert!(buf.as_slice::<i64>().is_empty());
        assert_eq!(buf.n_bytes(), 0);
    }

    #[test]
    fn from_slice_keeps_values() {
        let mut buf = CPUBuffer::from_slice(&[1i64, -2, 3]).unwrap();
        assert_eq!(buf.n_bytes(), 24);
        assert_eq!(buf.as_slice::<i64>(), &[1, -2, 3]);
        buf.as_slice_mut::<i64>()[0] = 9;
        assert_eq!(buf.as_slice::<i64>(), &[9, -2, 3]);
    }
}
