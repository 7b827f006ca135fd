use derive_new::new;

use crate::{
    op::dispatch, rvec, Enforcer, InvariantError, KernelOp, OpGuards, Operation, OperationError,
    RVec, Tensor,
};

/// Element-wise copy between two views of equal shape, honoring both layouts.
#[derive(new, Debug, Clone)]
pub struct Rearrange {
    out: Tensor,
    input: Tensor,
}

impl Rearrange {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }
}

impl OpGuards for Rearrange {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::check_shape("out", &self.out, self.input.shape())
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::check_dtype_match(&[&self.out, &self.input])?;
        Ok(())
    }
}

impl Operation for Rearrange {
    fn name(&self) -> &'static str {
        "Rearrange"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.input]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }

    fn requires_contiguous(&self) -> bool {
        false
    }
}

/// Copies `input` into `out` in logical order.
///
/// Either side may be strided, so this is how permuted or sliced views are materialized.
pub fn rearrange(out: &Tensor, input: &Tensor) -> Result<(), OperationError> {
    dispatch(KernelOp::Rearrange(Rearrange::new(out.clone(), input.clone())))
}

#[cfg(test)]
mod tests {
    use crate::{rearrange, shape, Device, InvariantError, OperationError, Tensor};

    #[test]
    fn materializes_transpose() {
        let x = Tensor::from_data([1i64, 2, 3, 4, 5, 6], shape![2, 3], Device::CPU).unwrap();
        let t = x.permute(&[1, 0]).unwrap();
        let out = Tensor::zeros::<i64>(shape![3, 2], Device::CPU).unwrap();
        rearrange(&out, &t).unwrap();
        assert!(out.is_contiguous());
        assert_eq!(out.to_vec::<i64>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn writes_into_strided_view() {
        let dst = Tensor::zeros::<f32>(shape![2, 4], Device::CPU).unwrap();
        let cols = dst.slice(1, 1, 3).unwrap();
        let src = Tensor::from_data([1f32, 2., 3., 4.], shape![2, 2], Device::CPU).unwrap();
        rearrange(&cols, &src).unwrap();
        assert_eq!(
            dst.to_vec::<f32>().unwrap(),
            vec![0., 1., 2., 0., 0., 3., 4., 0.]
        );
    }

    #[test]
    fn shape_and_dtype_must_match() {
        let src = Tensor::zeros::<f32>(shape![2, 2], Device::CPU).unwrap();
        let bad_shape = Tensor::zeros::<f32>(shape![4], Device::CPU).unwrap();
        assert!(matches!(
            rearrange(&bad_shape, &src),
            Err(OperationError::InvariantError(InvariantError::ShapeMismatch { .. }))
        ));
        let bad_dt = Tensor::zeros::<i32>(shape![2, 2], Device::CPU).unwrap();
        assert!(matches!(
            rearrange(&bad_dt, &src),
            Err(OperationError::InvariantError(InvariantError::DTypeMismatch { .. }))
        ));
    }

    #[test]
    fn empty_is_a_no_op() {
        let src = Tensor::zeros::<f32>(shape![3, 0], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![3, 0], Device::CPU).unwrap();
        rearrange(&out, &src).unwrap();
    }
}
