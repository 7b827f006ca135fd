use half::{bf16, f16};

use crate::{CPUOperation, DType, FloatDType, InvariantError, OperationError, SelfAttention, Tensor};

use super::{gemm::sgemm, scratch, store_float, to_float_vec};

impl CPUOperation for SelfAttention {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.q().dt() {
            DType::F32 => attention::<f32>(self),
            DType::F16 => attention::<f16>(self),
            DType::BF16 => attention::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

/// Widens `[len, n_kv_head, dim]` to `[len, n_kv_head * group, dim]`.
///
/// Query heads `g * group..(g + 1) * group` all read kv head `g`.
fn expand_kv<T: FloatDType>(t: &Tensor, group: usize) -> Result<Vec<f32>, OperationError> {
    let [len, n_kv_head, dim]: [usize; 3] = t.shape().try_into()?;
    let src = t.to_vec::<T>()?;
    let mut dst = scratch(len * n_kv_head * group * dim)?;
    for (src_row, dst_row) in src
        .chunks_exact(n_kv_head * dim)
        .zip(dst.chunks_exact_mut(n_kv_head * group * dim))
    {
        for (dst_head, dst_vals) in dst_row.chunks_exact_mut(dim).enumerate() {
            let kv_head = dst_head / group;
            let src_vals = &src_row[kv_head * dim..(kv_head + 1) * dim];
            for (y, x) in dst_vals.iter_mut().zip(src_vals) {
                *y = x.to_float();
            }
        }
    }
    Ok(dst)
}

/// Scales `row[..=last]`, turns it into a probability distribution, and zeroes `row[last + 1..]`.
fn masked_softmax(row: &mut [f32], last: usize, scale: f32) {
    let (visible, masked) = row.split_at_mut(last + 1);
    let mut max = f32::NEG_INFINITY;
    for x in visible.iter_mut() {
        *x *= scale;
        max = max.max(*x);
    }
    let mut sum = 0f32;
    for x in visible.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    visible.iter_mut().for_each(|x| *x /= sum);
    masked.fill(0.);
}

fn attention<T: FloatDType>(op: &SelfAttention) -> Result<(), OperationError> {
    let [seq_len, n_head, d]: [usize; 3] = op.q().shape().try_into()?;
    let [total_len, n_kv_head, _]: [usize; 3] = op.k().shape().try_into()?;
    let dv = op.v().shape()[2];
    let group = n_head / n_kv_head;

    let q = to_float_vec::<T>(op.q())?;
    let k = expand_kv::<T>(op.k(), group)?;
    let v = expand_kv::<T>(op.v(), group)?;

    // [seq_len, n_head, total_len]
    let mut scores = scratch(seq_len * n_head * total_len)?;
    for h in 0..n_head {
        sgemm(
            (seq_len, total_len, d),
            &mut scores[h * total_len..],
            (n_head * total_len, 1),
            &q[h * d..],
            (n_head * d, 1),
            &k[h * d..],
            (1, n_head * d),
        );
    }

    let offset = total_len - seq_len;
    for (i, query) in scores.chunks_exact_mut(n_head * total_len).enumerate() {
        for row in query.chunks_exact_mut(total_len) {
            masked_softmax(row, offset + i, op.scale());
        }
    }

    // [seq_len, n_head, dv]
    let mut out = scratch(seq_len * n_head * dv)?;
    for (i, (query, out_row)) in scores
        .chunks_exact(n_head * total_len)
        .zip(out.chunks_exact_mut(n_head * dv))
        .enumerate()
    {
        let visible = offset + i + 1;
        for (h, (weights, acc)) in query
            .chunks_exact(total_len)
            .zip(out_row.chunks_exact_mut(dv))
            .enumerate()
        {
            for (j, &w) in weights[..visible].iter().enumerate() {
                if w == 0. {
                    continue;
                }
                let base = (j * n_head + h) * dv;
                for (a, x) in acc.iter_mut().zip(&v[base..base + dv]) {
                    *a += w * x;
                }
            }
        }
    }
    store_float::<T>(op.attn_val(), &out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_positions_are_exactly_zero() {
        let mut row = [1f32, 2., 3., 1000.];
        masked_softmax(&mut row, 1, 1.);
        assert_eq!(row[2..], [0., 0.]);
        assert!((row[0] + row[1] - 1.).abs() < 1e-6);
        assert!(row[1] > row[0]);
    }

    #[test]
    fn large_scores_stay_finite() {
        let mut row = [1e4f32, 1e4, -1e4];
        masked_softmax(&mut row, 2, 10.);
        assert_eq!(row, [0.5, 0.5, 0.]);
    }
}
