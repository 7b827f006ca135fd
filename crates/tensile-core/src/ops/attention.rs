use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// Causal grouped-query attention of a query chunk over the full key/value history.
///
/// q: `[seq_len, n_head, d]`, k: `[total_len, n_kv_head, d]`, v: `[total_len, n_kv_head, dv]`,
/// attn_val: `[seq_len, n_head, dv]`. The query chunk is aligned to the end of the history,
/// so query `i` sees keys `0..=total_len - seq_len + i`.
#[derive(new, Debug, Clone)]
pub struct SelfAttention {
    attn_val: Tensor,
    q: Tensor,
    k: Tensor,
    v: Tensor,
    scale: f32,
}

impl SelfAttention {
    pub fn attn_val(&self) -> &Tensor {
        &self.attn_val
    }

    pub fn q(&self) -> &Tensor {
        &self.q
    }

    pub fn k(&self) -> &Tensor {
        &self.k
    }

    pub fn v(&self) -> &Tensor {
        &self.v
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

impl OpGuards for SelfAttention {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        for t in [&self.attn_val, &self.q, &self.k, &self.v] {
            Enforcer::assert_rank(t, 3)?;
        }
        Enforcer::check_nonzero("attention query", &self.q)?;
        Enforcer::check_nonzero("attention key", &self.k)?;
        Enforcer::check_nonzero("attention value", &self.v)?;
        let [seq_len, n_head, d]: [usize; 3] = self.q.shape().try_into().unwrap_or_default();
        let [total_len, n_kv_head, _]: [usize; 3] = self.k.shape().try_into().unwrap_or_default();
        let dv = self.v.shape()[2];
        Enforcer::check_dim("key head dim", self.k.shape()[2], d)?;
        Enforcer::check_shape("v", &self.v, &shape![total_len, n_kv_head, dv])?;
        Enforcer::check_shape("attn_val", &self.attn_val, &shape![seq_len, n_head, dv])
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::check_dtype_match(&[&self.attn_val, &self.q, &self.k, &self.v])?;
        Enforcer::assert_compute_dtype(&self.attn_val)?;
        Ok(())
    }

    fn check_custom(&self) -> Result<(), InvariantError> {
        let (seq_len, n_head) = (self.q.shape()[0], self.q.shape()[1]);
        let (total_len, n_kv_head) = (self.k.shape()[0], self.k.shape()[1]);
        if n_head % n_kv_head != 0 {
            return Err(InvariantError::IndivisibleHeads { n_head, n_kv_head });
        }
        if total_len < seq_len {
            return Err(InvariantError::CausalWindow { seq_len, total_len });
        }
        Ok(())
    }
}

impl Operation for SelfAttention {
    fn name(&self) -> &'static str {
        "SelfAttention"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.q, &self.k, &self.v]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.attn_val]
    }
}

/// `attn_val = softmax(mask(q k^T * scale)) v`, with each kv head shared by a contiguous
/// group of `n_head / n_kv_head` query heads.
pub fn self_attention(
    attn_val: &Tensor,
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    scale: f32,
) -> Result<(), OperationError> {
    dispatch(KernelOp::SelfAttention(SelfAttention::new(
        attn_val.clone(),
        q.clone(),
        k.clone(),
        v.clone(),
        scale,
    )))
}
