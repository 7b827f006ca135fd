use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// `out = input @ weight^T + bias`, with `weight` stored as `[out_features, in_features]`.
#[derive(new, Debug, Clone)]
pub struct Linear {
    out: Tensor,
    input: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl OpGuards for Linear {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.out, 2)?;
        Enforcer::assert_rank(&self.input, 2)?;
        Enforcer::assert_rank(&self.weight, 2)?;
        Enforcer::check_nonzero("linear input", &self.input)?;
        Enforcer::check_nonzero("linear weight", &self.weight)?;
        let (n, in_features) = (self.input.shape()[0], self.input.shape()[1]);
        let out_features = self.weight.shape()[0];
        Enforcer::check_dim("weight in_features", self.weight.shape()[1], in_features)?;
        Enforcer::check_shape("out", &self.out, &shape![n, out_features])?;
        if let Some(bias) = &self.bias {
            Enforcer::check_shape("bias", bias, &shape![out_features])?;
        }
        Ok(())
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        let dt = Enforcer::check_dtype_match(&self.srcs())?;
        Enforcer::assert_dtype(&self.out, dt)?;
        Enforcer::assert_compute_dtype(&self.out)?;
        Ok(())
    }
}

impl Operation for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        let mut srcs = rvec![&self.input, &self.weight];
        if let Some(bias) = &self.bias {
            srcs.push(bias);
        }
        srcs
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }
}

/// Dense projection, accumulated in f32 and rounded once per output element.
pub fn linear(
    out: &Tensor,
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<(), OperationError> {
    dispatch(KernelOp::Linear(Linear::new(
        out.clone(),
        input.clone(),
        weight.clone(),
        bias.cloned(),
    )))
}
