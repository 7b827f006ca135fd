use crate::{Backend, CpuBackend, GpuBackend};

#[derive(Clone, Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to allocate {0} bytes on {1:?}")]
    AllocationFailed(usize, Device),
    #[error("{1} is not implemented for {0:?}")]
    Unsupported(Device, String),
    #[error("Copy of {n_bytes} bytes at offset {offset} overruns a buffer of {size} bytes")]
    CopyOutOfBounds {
        offset: usize,
        n_bytes: usize,
        size: usize,
    },
}

pub enum DeviceRequest {
    CPU,
    GPU,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Device {
    #[default]
    CPU,
    GPU(usize),
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::CPU => write!(f, "CPU"),
            Device::GPU(ordinal) => write!(f, "GPU:{}", ordinal),
        }
    }
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::CPU)
    }

    /// Only the CPU can be acquired, there is no accelerator runtime behind `GPU`.
    pub fn request_device(request: DeviceRequest) -> Result<Self, DeviceError> {
        match request {
            DeviceRequest::CPU => Ok(Device::CPU),
            DeviceRequest::GPU => Err(DeviceError::Unsupported(
                Device::GPU(0),
                "device acquisition".to_string(),
            )),
        }
    }

    pub fn label(&self) -> String {
        format!("{:?}", self)
    }

    /// The execution target for kernels and allocations on this device.
    pub fn backend(&self) -> Box<dyn Backend> {
        match self {
            Device::CPU => Box::new(CpuBackend),
            Device::GPU(ordinal) => Box::new(GpuBackend::new(*ordinal)),
        }
    }
}
