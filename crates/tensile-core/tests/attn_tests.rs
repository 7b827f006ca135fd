#![allow(non_snake_case)]

#[cfg(test)]
mod tests {
    use half::f16;
    use tensile::{self_attention, shape, Device, ErrorKind, Tensor};
    use test_strategy::{proptest, Arbitrary};

    #[derive(Debug, derive_new::new)]
    struct AttentionCase {
        q: Tensor,
        k: Tensor,
        v: Tensor,
        scale: f32,
    }

    /// Direct transcription of causal grouped-query attention, accumulated in f64.
    fn attention_ground(case: &AttentionCase) -> anyhow::Result<Tensor> {
        let [seq_len, n_head, d]: [usize; 3] = case.q.shape().try_into()?;
        let [total_len, n_kv_head, _]: [usize; 3] = case.k.shape().try_into()?;
        let dv = case.v.shape()[2];
        let group = n_head / n_kv_head;
        let (q, k, v) = (
            case.q.to_vec_f32()?,
            case.k.to_vec_f32()?,
            case.v.to_vec_f32()?,
        );

        let mut out = vec![0f32; seq_len * n_head * dv];
        for i in 0..seq_len {
            let last = total_len - seq_len + i;
            for h in 0..n_head {
                let g = h / group;
                let scores = (0..=last)
                    .map(|j| {
                        let dot = (0..d)
                            .map(|p| {
                                q[(i * n_head + h) * d + p] as f64
                                    * k[(j * n_kv_head + g) * d + p] as f64
                            })
                            .sum::<f64>();
                        dot * case.scale as f64
                    })
                    .collect::<Vec<_>>();
                let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let exps = scores.iter().map(|s| (s - max).exp()).collect::<Vec<_>>();
                let sum = exps.iter().sum::<f64>();
                for e in 0..dv {
                    let acc = exps
                        .iter()
                        .enumerate()
                        .map(|(j, w)| w / sum * v[(j * n_kv_head + g) * dv + e] as f64)
                        .sum::<f64>();
                    out[(i * n_head + h) * dv + e] = acc as f32;
                }
            }
        }
        Ok(Tensor::from_data(out, shape![seq_len, n_head, dv], Device::CPU)?)
    }

    fn run_attention(case: &AttentionCase) -> anyhow::Result<Tensor> {
        let [seq_len, n_head, _]: [usize; 3] = case.q.shape().try_into()?;
        let dv = case.v.shape()[2];
        let out = Tensor::create(shape![seq_len, n_head, dv], case.q.dt(), Device::CPU)?;
        self_attention(&out, &case.q, &case.k, &case.v, case.scale)?;
        Ok(out)
    }

    #[derive(Arbitrary, Debug)]
    struct AttentionProblem {
        #[strategy(1..=8usize)]
        SL: usize,
        #[strategy(0..=8usize)]
        cached: usize,
        #[strategy(1..=4usize)]
        NKV: usize,
        #[strategy(1..=3usize)]
        group: usize,
        #[strategy(1..=32usize)]
        HD: usize,
        #[strategy(1..=32usize)]
        DV: usize,
    }

    #[proptest(cases = 16)]
    fn attention_matches_ground(prob: AttentionProblem) {
        let _ = env_logger::builder().is_test(true).try_init();
        let AttentionProblem {
            SL,
            cached,
            NKV,
            group,
            HD,
            DV,
        } = prob;
        let (TL, NH) = (SL + cached, NKV * group);
        let case = AttentionCase::new(
            Tensor::randn::<f32>(shape![SL, NH, HD], Device::CPU).unwrap(),
            Tensor::randn::<f32>(shape![TL, NKV, HD], Device::CPU).unwrap(),
            Tensor::randn::<f32>(shape![TL, NKV, DV], Device::CPU).unwrap(),
            1. / (HD as f32).sqrt(),
        );
        let ground = attention_ground(&case).unwrap();
        let ours = run_attention(&case).unwrap();
        ground.all_close(&ours, 1e-4, 1e-4).unwrap();
    }

    #[test]
    fn single_position_copies_value() -> anyhow::Result<()> {
        let case = AttentionCase::new(
            Tensor::from_data([1e3f32, -1e3], shape![1, 1, 2], Device::CPU)?,
            Tensor::from_data([5f32, 5.], shape![1, 1, 2], Device::CPU)?,
            Tensor::from_data([1.5f32, -2.5, 0.125], shape![1, 1, 3], Device::CPU)?,
            0.7,
        );
        let out = run_attention(&case)?;
        assert_eq!(out.to_vec::<f32>()?, vec![1.5, -2.5, 0.125]);
        Ok(())
    }

    #[test]
    fn first_query_only_sees_first_key() -> anyhow::Result<()> {
        // No cache: query 0 may only attend to key 0, whatever the later scores are.
        let case = AttentionCase::new(
            Tensor::from_data([0f32, 0., 1., 1.], shape![2, 1, 2], Device::CPU)?,
            Tensor::from_data([0f32, 0., 100., 100.], shape![2, 1, 2], Device::CPU)?,
            Tensor::from_data([3f32, 7.], shape![2, 1, 1], Device::CPU)?,
            1.,
        );
        let out = run_attention(&case)?.to_vec::<f32>()?;
        assert_eq!(out[0], 3.);
        assert!((out[1] - 7.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn cached_keys_stay_visible() -> anyhow::Result<()> {
        // One new query over three keys, all visible, equal scores average the values.
        let case = AttentionCase::new(
            Tensor::zeros::<f32>(shape![1, 1, 4], Device::CPU)?,
            Tensor::randn::<f32>(shape![3, 1, 4], Device::CPU)?,
            Tensor::from_data([1f32, 2., 6.], shape![3, 1, 1], Device::CPU)?,
            0.5,
        );
        let out = run_attention(&case)?.to_vec::<f32>()?;
        assert!((out[0] - 3.).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn gqa_uses_contiguous_groups() -> anyhow::Result<()> {
        // n_head = 4, n_kv_head = 2: heads {0, 1} read kv head 0, heads {2, 3} kv head 1.
        let q = Tensor::randn::<f32>(shape![1, 4, 8], Device::CPU)?;
        let k = Tensor::randn::<f32>(shape![1, 2, 8], Device::CPU)?;
        let v = Tensor::from_data([10f32, 11., 20., 21.], shape![1, 2, 2], Device::CPU)?;
        let out = run_attention(&AttentionCase::new(q, k, v, 0.25))?;
        assert_eq!(
            out.to_vec::<f32>()?,
            vec![10., 11., 10., 11., 20., 21., 20., 21.]
        );
        Ok(())
    }

    #[test]
    fn f16_matches_f32() -> anyhow::Result<()> {
        let (q, k, v) = (
            Tensor::randn::<f16>(shape![3, 4, 16], Device::CPU)?,
            Tensor::randn::<f16>(shape![5, 2, 16], Device::CPU)?,
            Tensor::randn::<f16>(shape![5, 2, 8], Device::CPU)?,
        );
        let case = AttentionCase::new(q, k, v, 0.25);
        let ground = attention_ground(&case)?;
        let ours = run_attention(&case)?;
        let ours = Tensor::from_data(ours.to_vec_f32()?, ours.shape().clone(), Device::CPU)?;
        ground.all_close(&ours, 1e-2, 1e-2)?;
        Ok(())
    }

    #[test]
    fn strided_query_is_rejected() -> anyhow::Result<()> {
        let q = Tensor::zeros::<f32>(shape![2, 2, 4], Device::CPU)?.slice(1, 0, 1)?;
        let k = Tensor::zeros::<f32>(shape![2, 1, 4], Device::CPU)?;
        let v = Tensor::zeros::<f32>(shape![2, 1, 4], Device::CPU)?;
        let out = Tensor::zeros::<f32>(shape![2, 1, 4], Device::CPU)?;
        let err = self_attention(&out, &q, &k, &v, 1.).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let q = q.contiguous()?;
        self_attention(&out, &q, &k, &v, 1.)?;
        Ok(())
    }
}
