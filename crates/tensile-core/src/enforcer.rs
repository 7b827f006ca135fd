use std::ops::RangeInclusive;

use crate::{DType, Device, Shape, Strides, Tensor, TensorId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum InvariantError {
    #[error("Shape mismatch for {name}, expected {expected:?}, got {actual:?}.")]
    ShapeMismatch {
        name: &'static str,
        expected: Shape,
        actual: Shape,
    },
    #[error("Dimension mismatch, {what}: {a} != {b}.")]
    DimMismatch {
        what: &'static str,
        a: usize,
        b: usize,
    },
    #[error("Rank mismatch. {accepted:?} != {actual}.")]
    RankMismatch {
        accepted: RangeInclusive<usize>,
        actual: usize,
    },
    #[error("DType mismatch, expected {expected:?}, got {actual:?}.")]
    DTypeMismatch { expected: DType, actual: DType },
    #[error("Unsupported DType {0:?}.")]
    UnsupportedDType(DType),
    #[error("Device mismatch, expected {expected:?}, got {actual:?}.")]
    DeviceMismatch { expected: Device, actual: Device },
    #[error("Tensor {id:?} is not contiguous, shape {shape:?} strides {strides:?}.")]
    NonContiguous {
        id: TensorId,
        shape: Shape,
        strides: Strides,
    },
    #[error("Zero sized dimension in {0}.")]
    ZeroSizedDim(&'static str),
    #[error("Invalid permutation {dims:?} for rank {rank}.")]
    InvalidPermutation { dims: Vec<usize>, rank: usize },
    #[error("Duplicate dims in permutation.")]
    DuplicateDims,
    #[error("Dim {dim} out of range for rank {rank}.")]
    DimOutOfRange { dim: usize, rank: usize },
    #[error("Invalid slice {start}..{end} of dim {dim} with size {size}.")]
    InvalidSlice {
        dim: usize,
        start: usize,
        end: usize,
        size: usize,
    },
    #[error("Incompatible view: {0}")]
    IncompatibleView(String),
    #[error("Element count mismatch, expected {expected}, got {actual}.")]
    ElementCount { expected: usize, actual: usize },
    #[error("{n_head} query heads cannot be grouped over {n_kv_head} kv heads.")]
    IndivisibleHeads { n_head: usize, n_kv_head: usize },
    #[error("Query length {seq_len} exceeds key length {total_len}.")]
    CausalWindow { seq_len: usize, total_len: usize },
    #[error("Rotary dimension must be even, got {0}.")]
    OddRotaryDim(usize),
}

/// # Enforcer
///
/// Enforcer enforces common invariants on tensors.
pub struct Enforcer;

impl Enforcer {
    pub fn check_device_match(tensors: &[&Tensor]) -> Result<Device, InvariantError> {
        let expected = tensors[0].device();
        for tensor in tensors.iter().skip(1) {
            if tensor.device() != expected {
                return Err(InvariantError::DeviceMismatch {
                    expected,
                    actual: tensor.device(),
                });
            }
        }
        Ok(expected)
    }

    pub fn check_dtype_match(tensors: &[&Tensor]) -> Result<DType, InvariantError> {
        let dtype = tensors[0].dt();
        for tensor in tensors.iter().skip(1) {
            if dtype != tensor.dt() {
                return Err(InvariantError::DTypeMismatch {
                    expected: dtype,
                    actual: tensor.dt(),
                });
            }
        }
        Ok(dtype)
    }

    pub fn assert_dtype(tensor: &Tensor, expected: DType) -> Result<(), InvariantError> {
        let actual = tensor.dt();
        if actual != expected {
            return Err(InvariantError::DTypeMismatch { expected, actual });
        }
        Ok(())
    }

    /// Kernels accumulate in f32, so only the float storage types are accepted.
    pub fn assert_compute_dtype(tensor: &Tensor) -> Result<DType, InvariantError> {
        let dt = tensor.dt();
        if !dt.is_float() {
            return Err(InvariantError::UnsupportedDType(dt));
        }
        Ok(dt)
    }

    pub fn assert_rank(tensor: &Tensor, rank: usize) -> Result<(), InvariantError> {
        if tensor.rank() != rank {
            return Err(InvariantError::RankMismatch {
                accepted: rank..=rank,
                actual: tensor.rank(),
            });
        }
        Ok(())
    }

    pub fn check_shape(
        name: &'static str,
        tensor: &Tensor,
        expected: &Shape,
    ) -> Result<(), InvariantError> {
        if tensor.shape() != expected {
            return Err(InvariantError::ShapeMismatch {
                name,
                expected: expected.clone(),
                actual: tensor.shape().clone(),
            });
        }
        Ok(())
    }

    pub fn check_dim(what: &'static str, a: usize, b: usize) -> Result<(), InvariantError> {
        if a != b {
            return Err(InvariantError::DimMismatch { what, a, b });
        }
        Ok(())
    }

    pub fn check_nonzero(name: &'static str, tensor: &Tensor) -> Result<(), InvariantError> {
        if tensor.shape().has_zero_dim() {
            return Err(InvariantError::ZeroSizedDim(name));
        }
        Ok(())
    }

    pub fn check_contiguous(tensor: &Tensor) -> Result<(), InvariantError> {
        if !tensor.is_contiguous() {
            return Err(InvariantError::NonContiguous {
                id: tensor.id(),
                shape: tensor.shape().clone(),
                strides: tensor.strides().clone(),
            });
        }
        Ok(())
    }

    /// `dims` must name every dimension in `0..rank` exactly once.
    pub fn check_permutation(dims: &[usize], rank: usize) -> Result<(), InvariantError> {
        if dims.len() != rank {
            return Err(InvariantError::InvalidPermutation {
                dims: dims.to_vec(),
                rank,
            });
        }
        let mut seen = vec![false; rank];
        for &d in dims {
            if d >= rank {
                return Err(InvariantError::DimOutOfRange { dim: d, rank });
            }
            if seen[d] {
                return Err(InvariantError::DuplicateDims);
            }
            seen[d] = true;
        }
        Ok(())
    }
}
