use derive_new::new;

use crate::{
    op::dispatch, rvec, Enforcer, InvariantError, KernelOp, OpGuards, Operation, OperationError,
    RVec, Tensor,
};

/// SiLU gated linear unit over `[seq_len, intermediate]`, `out = gate * sigmoid(gate) * up`.
#[derive(new, Debug, Clone)]
pub struct SwiGLU {
    out: Tensor,
    gate: Tensor,
    up: Tensor,
}

impl SwiGLU {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn gate(&self) -> &Tensor {
        &self.gate
    }

    pub fn up(&self) -> &Tensor {
        &self.up
    }
}

impl OpGuards for SwiGLU {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.gate, 2)?;
        Enforcer::check_nonzero("swiglu gate", &self.gate)?;
        Enforcer::check_shape("up", &self.up, self.gate.shape())?;
        Enforcer::check_shape("out", &self.out, self.gate.shape())
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::check_dtype_match(&[&self.out, &self.gate, &self.up])?;
        Enforcer::assert_compute_dtype(&self.out)?;
        Ok(())
    }
}

impl Operation for SwiGLU {
    fn name(&self) -> &'static str {
        "SwiGLU"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.gate, &self.up]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }
}

pub fn swiglu(out: &Tensor, gate: &Tensor, up: &Tensor) -> Result<(), OperationError> {
    dispatch(KernelOp::SwiGLU(SwiGLU::new(
        out.clone(),
        gate.clone(),
        up.clone(),
    )))
}
