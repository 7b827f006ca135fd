use half::{bf16, f16};

use crate::{CPUOperation, DType, FloatDType, InvariantError, OperationError, RoPE};

use super::cpu_store_result;

impl CPUOperation for RoPE {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.input().dt() {
            DType::F32 => rope::<f32>(self),
            DType::F16 => rope::<f16>(self),
            DType::BF16 => rope::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

/// `(sin, cos)` of `pos / theta^(2j / d)` for every pair `j`.
fn angles(pos: i64, theta: f32, d: usize) -> (Vec<f32>, Vec<f32>) {
    (0..d / 2)
        .map(|j| {
            let phi = pos as f32 / theta.powf((2 * j) as f32 / d as f32);
            phi.sin_cos()
        })
        .unzip()
}

fn rope<T: FloatDType>(op: &RoPE) -> Result<(), OperationError> {
    let [_, n_head, d]: [usize; 3] = op.input().shape().try_into()?;
    let half = d / 2;
    let input = op.input().to_vec::<T>()?;
    let positions = op.pos_ids().to_vec::<i64>()?;

    let mut out = vec![T::zero(); input.len()];
    let slot = n_head * d;
    for ((&pos, src), dst) in positions
        .iter()
        .zip(input.chunks_exact(slot))
        .zip(out.chunks_exact_mut(slot))
    {
        let (sin, cos) = angles(pos, op.theta(), d);
        for (x, y) in src.chunks_exact(d).zip(dst.chunks_exact_mut(d)) {
            let (y_lo, y_hi) = y.split_at_mut(half);
            for j in 0..half {
                let (a, b) = (x[j].to_float(), x[j + half].to_float());
                y_lo[j] = T::from_float(a * cos[j] - b * sin[j]);
                y_hi[j] = T::from_float(b * cos[j] + a * sin[j]);
            }
        }
    }
    cpu_store_result(op.out(), &out)
}
