use gemm::{gemm, Parallelism};
use half::{bf16, f16};

use crate::{CPUOperation, DType, FloatDType, InvariantError, Linear, OperationError};

use super::{scratch, store_float, to_float_vec};

/// Weight rows widened to f32 at a time.
const WEIGHT_BLOCK_ROWS: usize = 64;

/// `dst[m, n] = lhs[m, k] @ rhs[k, n]` over f32, overwriting `dst`.
///
/// Every operand is described by its row and column stride in elements, so transposed
/// and head-interleaved layouts are multiplied in place.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sgemm(
    (m, n, k): (usize, usize, usize),
    dst: &mut [f32],
    (dst_rs, dst_cs): (usize, usize),
    lhs: &[f32],
    (lhs_rs, lhs_cs): (usize, usize),
    rhs: &[f32],
    (rhs_rs, rhs_cs): (usize, usize),
) {
    if m == 0 || n == 0 || k == 0 {
        return;
    }
    assert!((m - 1) * dst_rs + (n - 1) * dst_cs < dst.len());
    assert!((m - 1) * lhs_rs + (k - 1) * lhs_cs < lhs.len());
    assert!((k - 1) * rhs_rs + (n - 1) * rhs_cs < rhs.len());
    unsafe {
        gemm(
            m,
            n,
            k,
            dst.as_mut_ptr(),
            dst_cs as isize,
            dst_rs as isize,
            false,
            lhs.as_ptr(),
            lhs_cs as isize,
            lhs_rs as isize,
            rhs.as_ptr(),
            rhs_cs as isize,
            rhs_rs as isize,
            0f32,
            1f32,
            false,
            false,
            false,
            Parallelism::None,
        )
    }
}

impl CPUOperation for Linear {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.input().dt() {
            DType::F32 => linear::<f32>(self),
            DType::F16 => linear::<f16>(self),
            DType::BF16 => linear::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

fn linear<T: FloatDType>(op: &Linear) -> Result<(), OperationError> {
    let [n, in_features]: [usize; 2] = op.input().shape().try_into()?;
    let out_features = op.weight().shape()[0];
    let input = to_float_vec::<T>(op.input())?;

    let mut out = scratch(n * out_features)?;
    {
        let guard = op.weight().storage();
        let offset = op.weight().offset();
        let weight =
            &guard.try_cpu()?.as_slice::<T>()[offset..offset + out_features * in_features];
        let mut block = scratch(WEIGHT_BLOCK_ROWS.min(out_features) * in_features)?;
        for (i, rows) in weight.chunks(WEIGHT_BLOCK_ROWS * in_features).enumerate() {
            let block = &mut block[..rows.len()];
            block
                .iter_mut()
                .zip(rows)
                .for_each(|(y, &x)| *y = x.to_float());
            // weight rows are [block_rows, in_features], read them as their transpose.
            sgemm(
                (n, rows.len() / in_features, in_features),
                &mut out[i * WEIGHT_BLOCK_ROWS..],
                (out_features, 1),
                &input,
                (in_features, 1),
                block,
                (1, in_features),
            );
        }
    }
    if let Some(bias) = op.bias() {
        let bias = to_float_vec::<T>(bias)?;
        for row in out.chunks_exact_mut(out_features) {
            row.iter_mut().zip(&bias).for_each(|(o, b)| *o += b);
        }
    }
    store_float::<T>(op.out(), &out)
}
