use half::{bf16, f16};

use crate::{CPUOperation, DType, FloatDType, InvariantError, OperationError, RMSNorm};

use super::{store_float, to_float_vec};

impl CPUOperation for RMSNorm {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.input().dt() {
            DType::F32 => rms_norm::<f32>(self),
            DType::F16 => rms_norm::<f16>(self),
            DType::BF16 => rms_norm::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

fn rms_norm<T: FloatDType>(op: &RMSNorm) -> Result<(), OperationError> {
    let mut x = to_float_vec::<T>(op.input())?;
    let weight = to_float_vec::<T>(op.weight())?;
    let d = weight.len();
    for row in x.chunks_exact_mut(d) {
        let mean_square = row.iter().map(|v| v * v).sum::<f32>() / d as f32;
        let rms = (mean_square + op.eps()).sqrt();
        for (v, w) in row.iter_mut().zip(&weight) {
            *v = *v / rms * w;
        }
    }
    store_float::<T>(op.out(), &x)
}
