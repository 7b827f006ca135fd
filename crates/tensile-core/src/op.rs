use crate::{ops::*, DeviceError, Enforcer, InvariantError, RVec, Tensor, TensorError};
use std::fmt::Debug;

/// Every kernel the runtime can execute, with its bound arguments.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum KernelOp {
    Argmax(Argmax),
    Embedding(Embedding),
    Linear(Linear),
    Rearrange(Rearrange),
    RMSNorm(RMSNorm),
    RoPE(RoPE),
    SelfAttention(SelfAttention),
    SwiGLU(SwiGLU),
}

impl KernelOp {
    pub fn name(&self) -> &'static str {
        match self {
            KernelOp::Argmax(a) => a.name(),
            KernelOp::Embedding(e) => e.name(),
            KernelOp::Linear(l) => l.name(),
            KernelOp::Rearrange(r) => r.name(),
            KernelOp::RMSNorm(n) => n.name(),
            KernelOp::RoPE(r) => r.name(),
            KernelOp::SelfAttention(s) => s.name(),
            KernelOp::SwiGLU(s) => s.name(),
        }
    }

    pub fn srcs(&self) -> RVec<&Tensor> {
        match self {
            KernelOp::Argmax(a) => a.srcs(),
            KernelOp::Embedding(e) => e.srcs(),
            KernelOp::Linear(l) => l.srcs(),
            KernelOp::Rearrange(r) => r.srcs(),
            KernelOp::RMSNorm(n) => n.srcs(),
            KernelOp::RoPE(r) => r.srcs(),
            KernelOp::SelfAttention(s) => s.srcs(),
            KernelOp::SwiGLU(s) => s.srcs(),
        }
    }

    pub fn dsts(&self) -> RVec<&Tensor> {
        match self {
            KernelOp::Argmax(a) => a.dsts(),
            KernelOp::Embedding(e) => e.dsts(),
            KernelOp::Linear(l) => l.dsts(),
            KernelOp::Rearrange(r) => r.dsts(),
            KernelOp::RMSNorm(n) => n.dsts(),
            KernelOp::RoPE(r) => r.dsts(),
            KernelOp::SelfAttention(s) => s.dsts(),
            KernelOp::SwiGLU(s) => s.dsts(),
        }
    }

    pub fn check_invariants(&self) -> Result<(), OperationError> {
        match self {
            KernelOp::Argmax(a) => a.check_invariants(),
            KernelOp::Embedding(e) => e.check_invariants(),
            KernelOp::Linear(l) => l.check_invariants(),
            KernelOp::Rearrange(r) => r.check_invariants(),
            KernelOp::RMSNorm(n) => n.check_invariants(),
            KernelOp::RoPE(r) => r.check_invariants(),
            KernelOp::SelfAttention(s) => s.check_invariants(),
            KernelOp::SwiGLU(s) => s.check_invariants(),
        }
    }
}

/// Validates `op`, then hands it to the backend of its destination device.
///
/// Nothing is written unless every invariant holds.
pub(crate) fn dispatch(op: KernelOp) -> Result<(), OperationError> {
    op.check_invariants()?;
    let dst = op.dsts()[0];
    let device = dst.device();
    log::debug!(
        "Dispatching {} on {:?}, dt {:?}, srcs {:?} -> {:?}",
        op.name(),
        device,
        dst.dt(),
        op.srcs().iter().map(|t| t.shape()).collect::<Vec<_>>(),
        dst.shape()
    );
    device.backend().apply(&op)
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error(transparent)]
    InvariantError(#[from] InvariantError),
    #[error(transparent)]
    DeviceError(#[from] DeviceError),
    #[error("Index {index} out of range, expected 0 <= index < {bound}")]
    IndexOutOfRange { index: i64, bound: usize },
    #[error("Failed to allocate {0} bytes of scratch memory")]
    AllocationFailed(usize),
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

impl From<TensorError> for OperationError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::InvariantError(e) => e.into(),
            TensorError::DeviceError(e) => e.into(),
            TensorError::OperationError(e) => e,
        }
    }
}

/// Coarse classification of failures, for callers that only need to branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    OutOfRange,
    Unsupported,
    Allocation,
    Internal,
}

impl OperationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperationError::InvariantError(InvariantError::UnsupportedDType(_)) => {
                ErrorKind::Unsupported
            }
            OperationError::InvariantError(_) => ErrorKind::InvalidArgument,
            OperationError::DeviceError(DeviceError::Unsupported(..)) => ErrorKind::Unsupported,
            OperationError::DeviceError(DeviceError::AllocationFailed(..)) => ErrorKind::Allocation,
            OperationError::DeviceError(DeviceError::CopyOutOfBounds { .. }) => {
                ErrorKind::InvalidArgument
            }
            OperationError::IndexOutOfRange { .. } => ErrorKind::OutOfRange,
            OperationError::AllocationFailed(_) => ErrorKind::Allocation,
            OperationError::UnknownError(_) => ErrorKind::Internal,
        }
    }
}

/// # Operation Guards - Runtime guards for operation correctness.
///
/// The Rust type system cannot express the shape relationships between kernel arguments,
/// so they are checked at runtime, before any data is touched.
pub trait OpGuards {
    fn check_shapes(&self) -> Result<(), InvariantError>;

    fn check_dtypes(&self) -> Result<(), InvariantError>;

    // Some operations have invariants beyond shape and dtype.
    // e.g head counts that must divide evenly
    fn check_custom(&self) -> Result<(), InvariantError> {
        Ok(())
    }
}

/// # Operation
///
/// A kernel invocation with its source and destination tensors bound.
pub trait Operation: OpGuards + Debug + 'static {
    fn name(&self) -> &'static str;

    fn srcs(&self) -> RVec<&Tensor>;

    fn dsts(&self) -> RVec<&Tensor>;

    /// Kernels index raw buffers with canonical strides unless they say otherwise.
    fn requires_contiguous(&self) -> bool {
        true
    }

    /// # Check Invariants
    ///
    /// Device, shape, custom, dtype and layout checks, in that order.
    fn check_invariants(&self) -> Result<(), OperationError> {
        let tensors = self
            .dsts()
            .into_iter()
            .chain(self.srcs())
            .collect::<RVec<_>>();
        Enforcer::check_device_match(&tensors)?;
        self.check_shapes()?;
        self.check_custom()?;
        self.check_dtypes()?;
        if self.requires_contiguous() {
            for t in tensors {
                Enforcer::check_contiguous(t)?;
            }
        }
        Ok(())
    }
}
