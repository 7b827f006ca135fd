//! Backend trait - the seam between validated operations and an execution target.
//!
//! A [Device] resolves to exactly one backend. Operations are validated before they
//! reach a backend, so implementations only ever see well formed arguments.

use crate::{Device, DeviceError, KernelOp, OperationError, Storage};

/// Direction of a buffer copy, relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcpyKind {
    H2H,
    H2D,
    D2H,
    D2D,
}

impl MemcpyKind {
    pub fn between(src: Device, dst: Device) -> Self {
        match (src.is_cpu(), dst.is_cpu()) {
            (true, true) => MemcpyKind::H2H,
            (true, false) => MemcpyKind::H2D,
            (false, true) => MemcpyKind::D2H,
            (false, false) => MemcpyKind::D2D,
        }
    }
}

pub trait Backend: Send + Sync + std::fmt::Debug {
    /// The device this backend executes on.
    fn device(&self) -> Device;

    /// Allocate `n_bytes` of zeroed memory.
    fn allocate(&self, n_bytes: usize, alignment: usize) -> Result<Storage, DeviceError>;

    /// Copy `n_bytes` from `src` to `dst`, offsets are in bytes.
    fn copy(
        &self,
        dst: &mut Storage,
        dst_offset: usize,
        src: &Storage,
        src_offset: usize,
        n_bytes: usize,
        kind: MemcpyKind,
    ) -> Result<(), DeviceError>;

    /// Execute a validated operation, writing into its destination tensors.
    fn apply(&self, op: &KernelOp) -> Result<(), OperationError>;
}
