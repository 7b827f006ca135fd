use half::{bf16, f16};

use crate::{Argmax, CPUOperation, DType, FloatDType, InvariantError, OperationError};

use super::cpu_store_result;

impl CPUOperation for Argmax {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.vals().dt() {
            DType::F32 => argmax::<f32>(self),
            DType::F16 => argmax::<f16>(self),
            DType::BF16 => argmax::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

/// Position and value of the first maximum, compared as f32.
fn first_max<T: FloatDType>(vals: &[T]) -> Option<(usize, T)> {
    let (first, rest) = vals.split_first()?;
    let mut best = (0, *first, first.to_float());
    for (i, &v) in rest.iter().enumerate() {
        let f = v.to_float();
        if f > best.2 {
            best = (i + 1, v, f);
        }
    }
    Some((best.0, best.1))
}

fn argmax<T: FloatDType>(op: &Argmax) -> Result<(), OperationError> {
    let vals = op.vals().to_vec::<T>()?;
    let (idx, val) = first_max(&vals).ok_or(InvariantError::ZeroSizedDim("argmax input"))?;
    cpu_store_result(op.max_idx(), &[idx as i64])?;
    cpu_store_result(op.max_val(), &[val])
}
