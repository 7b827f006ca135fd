use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, DType, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// Index and value of the largest element of a 1-D tensor.
#[derive(new, Debug, Clone)]
pub struct Argmax {
    max_idx: Tensor,
    max_val: Tensor,
    vals: Tensor,
}

impl Argmax {
    pub fn max_idx(&self) -> &Tensor {
        &self.max_idx
    }

    pub fn max_val(&self) -> &Tensor {
        &self.max_val
    }

    pub fn vals(&self) -> &Tensor {
        &self.vals
    }
}

impl OpGuards for Argmax {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.vals, 1)?;
        Enforcer::check_nonzero("argmax input", &self.vals)?;
        Enforcer::check_shape("max_idx", &self.max_idx, &shape![1])?;
        Enforcer::check_shape("max_val", &self.max_val, &shape![1])
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_compute_dtype(&self.vals)?;
        Enforcer::check_dtype_match(&[&self.max_val, &self.vals])?;
        Enforcer::assert_dtype(&self.max_idx, DType::I64)
    }
}

impl Operation for Argmax {
    fn name(&self) -> &'static str {
        "Argmax"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.vals]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.max_idx, &self.max_val]
    }
}

/// Writes the first index of the maximum of `vals` into `max_idx`, and the maximum into `max_val`.
///
/// Ties resolve to the earliest index.
pub fn argmax(max_idx: &Tensor, max_val: &Tensor, vals: &Tensor) -> Result<(), OperationError> {
    dispatch(KernelOp::Argmax(Argmax::new(
        max_idx.clone(),
        max_val.clone(),
        vals.clone(),
    )))
}
