use derive_new::new;

use crate::{
    op::dispatch, rvec, shape, DType, Enforcer, InvariantError, KernelOp, OpGuards, Operation,
    OperationError, RVec, Tensor,
};

/// Rotary position embedding over `[seq_len, n_head, d]`.
///
/// Feature `j` is rotated together with feature `j + d / 2`.
#[derive(new, Debug, Clone)]
pub struct RoPE {
    out: Tensor,
    input: Tensor,
    pos_ids: Tensor,
    theta: f32,
}

impl RoPE {
    pub fn out(&self) -> &Tensor {
        &self.out
    }

    pub fn input(&self) -> &Tensor {
        &self.input
    }

    pub fn pos_ids(&self) -> &Tensor {
        &self.pos_ids
    }

    pub fn theta(&self) -> f32 {
        self.theta
    }
}

impl OpGuards for RoPE {
    fn check_shapes(&self) -> Result<(), InvariantError> {
        Enforcer::assert_rank(&self.input, 3)?;
        Enforcer::assert_rank(&self.pos_ids, 1)?;
        Enforcer::check_nonzero("rope input", &self.input)?;
        Enforcer::check_shape("out", &self.out, self.input.shape())?;
        Enforcer::check_shape("pos_ids", &self.pos_ids, &shape![self.input.shape()[0]])
    }

    fn check_dtypes(&self) -> Result<(), InvariantError> {
        Enforcer::check_dtype_match(&[&self.out, &self.input])?;
        Enforcer::assert_compute_dtype(&self.out)?;
        Enforcer::assert_dtype(&self.pos_ids, DType::I64)
    }

    fn check_custom(&self) -> Result<(), InvariantError> {
        let d = self.input.shape()[2];
        if d % 2 != 0 {
            return Err(InvariantError::OddRotaryDim(d));
        }
        Ok(())
    }
}

impl Operation for RoPE {
    fn name(&self) -> &'static str {
        "RoPE"
    }

    fn srcs(&self) -> RVec<&Tensor> {
        rvec![&self.input, &self.pos_ids]
    }

    fn dsts(&self) -> RVec<&Tensor> {
        rvec![&self.out]
    }
}

/// Rotates every head at slot `s` by angles derived from `pos_ids[s]` and `theta`.
pub fn rope(
    out: &Tensor,
    input: &Tensor,
    pos_ids: &Tensor,
    theta: f32,
) -> Result<(), OperationError> {
    dispatch(KernelOp::RoPE(RoPE::new(
        out.clone(),
        input.clone(),
        pos_ids.clone(),
        theta,
    )))
}

#[cfg(test)]
mod tests {
    use half::bf16;
    use test_strategy::{proptest, Arbitrary};

    use crate::{rope, shape, Device, ErrorKind, InvariantError, OperationError, Tensor};

    fn ground_truth(x: &[f32], pos: &[i64], n_head: usize, d: usize, theta: f32) -> Vec<f32> {
        let half = d / 2;
        let mut out = x.to_vec();
        for (s, &p) in pos.iter().enumerate() {
            for h in 0..n_head {
                let base = (s * n_head + h) * d;
                for j in 0..half {
                    let phi = p as f64 / (theta as f64).powf(2. * j as f64 / d as f64);
                    let (sin, cos) = phi.sin_cos();
                    let (a, b) = (x[base + j] as f64, x[base + j + half] as f64);
                    out[base + j] = (a * cos - b * sin) as f32;
                    out[base + j + half] = (b * cos + a * sin) as f32;
                }
            }
        }
        out
    }

    #[test]
    fn position_zero_is_identity() {
        let x = Tensor::randn::<f32>(shape![3, 2, 8], Device::CPU).unwrap();
        let pos = Tensor::from_data([0i64; 3], shape![3], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![3, 2, 8], Device::CPU).unwrap();
        rope(&out, &x, &pos, 123.0).unwrap();
        assert_eq!(out.to_vec::<f32>().unwrap(), x.to_vec::<f32>().unwrap());
    }

    #[test]
    fn quarter_turn() {
        // d = 2 rotates the single pair by `pos` radians.
        let x = Tensor::from_data([1f32, 0.], shape![1, 1, 2], Device::CPU).unwrap();
        let pos = Tensor::from_data([1i64], shape![1], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![1, 1, 2], Device::CPU).unwrap();
        rope(&out, &x, &pos, 10000.).unwrap();
        let got = out.to_vec::<f32>().unwrap();
        assert!((got[0] - 1f32.cos()).abs() < 1e-6);
        assert!((got[1] - 1f32.sin()).abs() < 1e-6);
    }

    #[test]
    fn odd_dim_rejected() {
        let x = Tensor::zeros::<f32>(shape![1, 1, 3], Device::CPU).unwrap();
        let pos = Tensor::zeros::<i64>(shape![1], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![1, 1, 3], Device::CPU).unwrap();
        assert!(matches!(
            rope(&out, &x, &pos, 10000.),
            Err(OperationError::InvariantError(InvariantError::OddRotaryDim(3)))
        ));
    }

    #[test]
    fn pos_ids_length_checked() {
        let x = Tensor::zeros::<f32>(shape![2, 1, 4], Device::CPU).unwrap();
        let pos = Tensor::zeros::<i64>(shape![3], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![2, 1, 4], Device::CPU).unwrap();
        assert!(rope(&out, &x, &pos, 10000.).is_err());
    }

    #[derive(Arbitrary, Debug)]
    struct RoPEProblem {
        #[strategy(1..=16usize)]
        SL: usize,
        #[strategy(1..=4usize)]
        NH: usize,
        #[strategy(1..=32usize)]
        half_dim: usize,
        #[strategy(0..=512i64)]
        start: i64,
    }

    #[proptest(cases = 16)]
    fn matches_ground_truth(prob: RoPEProblem) {
        let RoPEProblem {
            SL,
            NH,
            half_dim,
            start,
        } = prob;
        let HD = half_dim * 2;
        let positions = (start..start + SL as i64).collect::<Vec<_>>();
        let x = Tensor::randn::<f32>(shape![SL, NH, HD], Device::CPU).unwrap();
        let pos = Tensor::from_data(&positions, shape![SL], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![SL, NH, HD], Device::CPU).unwrap();
        rope(&out, &x, &pos, 10000.).unwrap();

        let expected = ground_truth(&x.to_vec::<f32>().unwrap(), &positions, NH, HD, 10000.);
        let expected = Tensor::from_data(expected, shape![SL, NH, HD], Device::CPU).unwrap();
        expected.all_close(&out, 1e-3, 1e-3).unwrap();
    }

    #[test]
    fn bf16_is_supported() {
        let x = Tensor::from_data([1f32, 0.].map(bf16::from_f32), shape![1, 1, 2], Device::CPU)
            .unwrap();
        let pos = Tensor::from_data([0i64], shape![1], Device::CPU).unwrap();
        let out = Tensor::zeros::<bf16>(shape![1, 1, 2], Device::CPU).unwrap();
        rope(&out, &x, &pos, 10000.).unwrap();
        assert_eq!(out.to_vec::<bf16>().unwrap(), vec![bf16::ONE, bf16::ZERO]);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let x = Tensor::zeros::<f32>(shape![0, 1, 2], Device::CPU).unwrap();
        let pos = Tensor::zeros::<i64>(shape![0], Device::CPU).unwrap();
        let out = Tensor::zeros::<f32>(shape![0, 1, 2], Device::CPU).unwrap();
        let err = rope(&out, &x, &pos, 10000.).unwrap_err();
        assert!(matches!(
            err,
            OperationError::InvariantError(InvariantError::ZeroSizedDim(_))
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
