use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, DType, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// Row gather from a `[vocab, hidden]` table.
#[derive(new, Debug, Clone)]
pub struct Embedding {
    out: Tensor,
    index: Tensor,
    weight: Tensor,
}

impl Embedding {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn index(&self) -> &Tensor {
        &self.index
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }
}

impl OpGuards for Embedding {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.out, 2)?;
        Enforcer::assert_rank(&self.index, 1)?;
        Enforcer::assert_rank(&self.weight, 2)?;
        for (name, t) in [("out", &self.out), ("index", &self.index), ("weight", &self.weight)] {
            Enforcer::check_nonzero(name, t)?;
        }
        let (batch, hidden) = (self.index.shape()[0], self.weight.shape()[1]);
        Enforcer::check_shape("out", &self.out, &shape![batch, hidden])
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_dtype(&self.index, DType::I64)?;
        Enforcer::check_dtype_match(&[&self.out, &self.weight])?;
        Enforcer::assert_compute_dtype(&self.weight)?;
        Ok(())
    }
}

impl Operation for Embedding {
    fn name(&self) -> &'static str {
        "Embedding"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.index, &self.weight]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }
}

/// Copies `weight[index[i]]` into `out[i]` for every `i`.
///
/// Every index is checked against the vocabulary before anything is written.
pub fn embedding(out: &Tensor, index: &Tensor, weight: &Tensor) -> Result<(), OperationError> {
    dispatch(KernelOp::Embedding(Embedding::new(
        out.clone(),
        index.clone(),
        weight.clone(),
    )))
}
