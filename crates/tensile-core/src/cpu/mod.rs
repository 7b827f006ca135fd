mod attention;
mod gemm;
mod norm;
mod reduce;
mod reindex;
mod rope;
mod select;
mod unary;
mod utils;

use crate::{
    Backend, CPUBuffer, Device, DeviceError, KernelOp, MemcpyKind, Operation, OperationError,
    Storage,
};

pub(crate) use utils::*;

/// Host execution target. Stateless, every kernel runs on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    fn device(&self) -> Device {
        Device::CPU
    }

    fn allocate(&self, n_bytes: usize, alignment: usize) -> Result<Storage, DeviceError> {
        Ok(Storage::CPU(CPUBuffer::zeroed(n_bytes, alignment)?))
    }

    fn copy(
        &self,
        dst: &mut Storage,
        dst_offset: usize,
        src: &Storage,
        src_offset: usize,
        n_bytes: usize,
        kind: MemcpyKind,
    ) -> Result<(), DeviceError> {
        if kind != MemcpyKind::H2H {
            return Err(DeviceError::Unsupported(Device::CPU, format!("{:?} copy", kind)));
        }
        for (storage, offset) in [(&*dst, dst_offset), (src, src_offset)] {
            if offset + n_bytes > storage.n_bytes() {
                return Err(DeviceError::CopyOutOfBounds {
                    offset,
                    n_bytes,
                    size: storage.n_bytes(),
                });
            }
        }
        let src = &src.try_cpu()?.as_bytes()[src_offset..src_offset + n_bytes];
        dst.try_cpu_mut()?.as_bytes_mut()[dst_offset..dst_offset + n_bytes].copy_from_slice(src);
        Ok(())
    }

    fn apply(&self, op: &KernelOp) -> Result<(), OperationError> {
        match op {
            KernelOp::Argmax(a) => a.apply_cpu(),
            KernelOp::Embedding(e) => e.apply_cpu(),
            KernelOp::Linear(l) => l.apply_cpu(),
            KernelOp::Rearrange(r) => r.apply_cpu(),
            KernelOp::RMSNorm(n) => n.apply_cpu(),
            KernelOp::RoPE(r) => r.apply_cpu(),
            KernelOp::SelfAttention(s) => s.apply_cpu(),
            KernelOp::SwiGLU(s) => s.apply_cpu(),
        }
    }
}

pub trait CPUOperation: Operation {
    fn apply_cpu(&self) -> Result<(), OperationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_copy() {
        let backend = CpuBackend;
        let src = Storage::CPU(CPUBuffer::from_slice(&[1u32, 2, 3, 4]).unwrap());
        let mut dst = backend.allocate(16, 4).unwrap();
        backend.copy(&mut dst, 4, &src, 8, 8, MemcpyKind::H2H).unwrap();
        assert_eq!(dst.try_cpu().unwrap().as_slice::<u32>(), &[0, 3, 4, 0]);
        assert!(backend
            .copy(&mut dst, 0, &src, 0, 4, MemcpyKind::H2D)
            .is_err());
    }

    #[test]
    fn host_copy_is_bounds_checked() {
        let backend = CpuBackend;
        let src = Storage::CPU(CPUBuffer::from_slice(&[1u32, 2]).unwrap());
        let mut dst = backend.allocate(16, 4).unwrap();
        assert!(matches!(
            backend.copy(&mut dst, 0, &src, 4, 8, MemcpyKind::H2H),
            Err(DeviceError::CopyOutOfBounds {
                offset: 4,
                n_bytes: 8,
                size: 8
            })
        ));
        assert!(matches!(
            backend.copy(&mut dst, 12, &src, 0, 8, MemcpyKind::H2H),
            Err(DeviceError::CopyOutOfBounds { size: 16, .. })
        ));
        assert_eq!(dst.try_cpu().unwrap().as_slice::<u32>(), &[0; 4]);
    }
}
