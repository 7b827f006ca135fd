use crate::{FloatDType, OperationError, Tensor, TensorDType};

/// Writes `data` into `dst` in logical order.
pub(crate) fn cpu_store_result<T: TensorDType>(
    dst: &Tensor,
    data: &[T],
) -> Result<(), OperationError> {
    dst.load(data)?;
    Ok(())
}

/// Reads a tensor widened to f32.
pub(crate) fn to_float_vec<T: FloatDType>(t: &Tensor) -> Result<Vec<f32>, OperationError> {
    Ok(t.to_vec::<T>()?.into_iter().map(T::to_float).collect())
}

/// Rounds f32 results back to the storage type and writes them.
pub(crate) fn store_float<T: FloatDType>(dst: &Tensor, data: &[f32]) -> Result<(), OperationError> {
    let data = data.iter().map(|&x| T::from_float(x)).collect::<Vec<_>>();
    cpu_store_result(dst, &data)
}

/// Zeroed f32 scratch. Fails with `AllocationFailed` instead of aborting.
pub(crate) fn scratch(len: usize) -> Result<Vec<f32>, OperationError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| OperationError::AllocationFailed(len * std::mem::size_of::<f32>()))?;
    buffer.resize(len, 0.);
    Ok(buffer)
}
