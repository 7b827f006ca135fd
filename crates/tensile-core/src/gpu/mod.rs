use crate::{Backend, Device, DeviceError, KernelOp, MemcpyKind, OperationError, Storage};

/// Placeholder for accelerator execution, every entry point fails.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct GpuBackend {
    ordinal: usize,
}

impl GpuBackend {
    fn unsupported(&self, what: impl Into<String>) -> DeviceError {
        DeviceError::Unsupported(self.device(), what.into())
    }
}

impl Backend for GpuBackend {
    fn device(&self) -> Device {
        Device::GPU(self.ordinal)
    }

    fn allocate(&self, n_bytes: usize, _alignment: usize) -> Result<Storage, DeviceError> {
        Err(self.unsupported(format!("allocation of {} bytes", n_bytes)))
    }

    fn copy(
        &self,
        _dst: &mut Storage,
        _dst_offset: usize,
        _src: &Storage,
        _src_offset: usize,
        _n_bytes: usize,
        kind: MemcpyKind,
    ) -> Result<(), DeviceError> {
        Err(self.unsupported(format!("{:?} copy", kind)))
    }

    fn apply(&self, op: &KernelOp) -> Result<(), OperationError> {
        Err(self.unsupported(op.name()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_point_fails() {
        let backend = GpuBackend::new(0);
        assert!(matches!(
            backend.allocate(16, 4),
            Err(DeviceError::Unsupported(Device::GPU(0), _))
        ));
        assert_eq!(
            MemcpyKind::between(Device::CPU, Device::GPU(0)),
            MemcpyKind::H2D
        );
    }
}
