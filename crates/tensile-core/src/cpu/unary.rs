use half::{bf16, f16};

use crate::{CPUOperation, DType, FloatDType, InvariantError, OperationError, SwiGLU};

use super::cpu_store_result;

impl CPUOperation for SwiGLU {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.gate().dt() {
            DType::F32 => swiglu::<f32>(self),
            DType::F16 => swiglu::<f16>(self),
            DType::BF16 => swiglu::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

#[inline]
fn silu(x: f32) -> f32 {
    x / (1. + (-x).exp())
}

fn swiglu<T: FloatDType>(op: &SwiGLU) -> Result<(), OperationError> {
    let gate = op.gate().to_vec::<T>()?;
    let up = op.up().to_vec::<T>()?;
    let out = gate
        .iter()
        .zip(&up)
        .map(|(g, u)| T::from_float(silu(g.to_float()) * u.to_float()))
        .collect::<Vec<_>>();
    cpu_store_result(op.out(), &out)
}
