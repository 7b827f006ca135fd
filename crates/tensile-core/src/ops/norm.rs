use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// Row-wise root mean square normalization of a 2-D tensor.
#[derive(new, Debug, Clone)]
pub struct RMSNorm {
    out: Tensor,
    input: Tensor,
    weight: Tensor,
    eps: f32,
}

impl RMSNorm {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }
}

impl OpGuards for RMSNorm {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.input, 2)?;
        Enforcer::assert_rank(&self.weight, 1)?;
        Enforcer::check_nonzero("rms_norm input", &self.input)?;
        Enforcer::check_shape("out", &self.out, self.input.shape())?;
        Enforcer::check_shape("weight", &self.weight, &shape![self.input.shape()[1]])
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::check_dtype_match(&[&self.out, &self.input, &self.weight])?;
        Enforcer::assert_compute_dtype(&self.out)?;
        Ok(())
    }
}

impl Operation for RMSNorm {
    fn name(&self) -> &'static str {
        "RMSNorm"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.input, &self.weight]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }
}

/// `out[i, j] = weight[j] * input[i, j] / sqrt(mean(input[i]^2) + eps)`
pub fn rms_norm(
    out: &Tensor,
    input: &Tensor,
    weight: &Tensor,
    eps: f32,
) -> Result<(), OperationError> {
    dispatch(KernelOp::RMSNorm(RMSNorm::new(
        out.clone(),
        input.clone(),
        weight.clone(),
        eps,
    )))
}

#[cfg(test)]
mod tests {
    use half::f16;
    use test_strategy::{proptest, Arbitrary};

    use crate::{rms_norm, shape, Device, ErrorKind, InvariantError, OperationError, Tensor};

    fn ground_truth(x: &[f32], w: &[f32], eps: f32) -> Vec<f32> {
        let d = w.len();
        x.chunks(d)
            .flat_map(|row| {
                let ms = row.iter().map(|v| v * v).sum::<f32>() / d as f32;
                let rms = (ms + eps).sqrt();
                row.iter()
                    .zip(w)
                    .map(move |(v, w)| v / rms * w)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn three_four_row() {
        let x = Tensor::from_data([3f32, 4.], shape![1, 2], Device::CPU).unwrap();
        let w = Tensor::from_data([1f32, 1.], shape![2], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![1, 2], Device::CPU).unwrap();
        rms_norm(&out, &x, &w, 0.).unwrap();
        let expected = Tensor::from_data([0.8485f32, 1.1314], shape![1, 2], Device::CPU).unwrap();
        expected.all_close(&out, 1e-4, 0.).unwrap();
    }

    #[test]
    fn weight_length_is_checked() {
        let x = Tensor::zeros::<f32>(shape![2, 3], Device::CPU).unwrap();
        let w = Tensor::zeros::<f32>(shape![2], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![2, 3], Device::CPU).unwrap();
        assert!(rms_norm(&out, &x, &w, 1e-5).is_err());
    }

    #[test]
    fn in_place() {
        let x = Tensor::from_data([3f32, 4., 0., 0.], shape![2, 2], Device::CPU).unwrap();
        let w = Tensor::from_data([1f32, 2.], shape![2], Device::CPU).unwrap();
        rms_norm(&x, &x, &w, 1e-6).unwrap();
        let got = x.to_vec::<f32>().unwrap();
        assert!((got[0] - 0.8485).abs() < 1e-3);
        assert!((got[1] - 2.2627).abs() < 1e-3);
        assert_eq!(&got[2..], &[0., 0.]);
    }

    #[derive(Arbitrary, Debug)]
    struct NormProblem {
        #[strategy(1..=8usize)]
        N: usize,
        #[strategy(1..=256usize)]
        D: usize,
    }

    #[proptest(cases = 16)]
    fn f16_matches_ground_truth(prob: NormProblem) {
        let NormProblem { N, D } = prob;
        let x = Tensor::randn::<f16>(shape![N, D], Device::CPU).unwrap();
        let w = Tensor::randn::<f16>(shape![D], Device::CPU).unwrap();
        let out = Tensor::zeros::<f16>(shape![N, D], Device::CPU).unwrap();
        rms_norm(&out, &x, &w, 1e-5).unwrap();

        let expected = ground_truth(&x.to_vec_f32().unwrap(), &w.to_vec_f32().unwrap(), 1e-5);
        let expected = Tensor::from_data(expected, shape![N, D], Device::CPU).unwrap();
        let ours = Tensor::from_data(out.to_vec_f32().unwrap(), shape![N, D], Device::CPU).unwrap();
        expected.all_close(&ours, 1e-2, 1e-2).unwrap();
    }

    #[test]
    fn empty_rows_are_rejected() {
        let x = Tensor::zeros::<f32>(shape![0, 3], Device::CPU).unwrap();
        let w = Tensor::zeros::<f32>(shape![3], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![0, 3], Device::CPU).unwrap();
        let err = rms_norm(&out, &x, &w, 1e-5).unwrap_err();
        assert!(matches!(
            err,
            OperationError::InvariantError(InvariantError::ZeroSizedDim(_))
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
