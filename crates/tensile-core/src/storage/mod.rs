mod cpu_buffer;

pub use cpu_buffer::*;

use crate::DeviceError;

/// Physical memory behind one or more tensor views.
#[derive(Debug)]
#[non_exhaustive]
pub enum Storage {
    CPU(CPUBuffer),
}

impl Storage {
    pub fn n_bytes(&self) -> usize {
        match self {
            Storage::CPU(c) => c.n_bytes(),
        }
    }

    pub fn try_cpu(&self) -> Result<&CPUBuffer, DeviceError> {
        match self {
            Storage::CPU(c) => Ok(c),
        }
    }

    pub fn try_cpu_mut(&mut self) -> Result<&mut CPUBuffer, DeviceError> {
        match self {
            Storage::CPU(c) => Ok(c),
        }
    }
}
