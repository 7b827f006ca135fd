use half::{bf16, f16};

use crate::{CPUOperation, DType, OperationError, Rearrange, TensorDType};

use super::cpu_store_result;

impl CPUOperation for Rearrange {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.input().dt() {
            DType::F32 => rearrange::<f32>(self),
            DType::F16 => rearrange::<f16>(self),
            DType::BF16 => rearrange::<bf16>(self),
            DType::I32 => rearrange::<i32>(self),
            DType::U32 => rearrange::<u32>(self),
            DType::I64 => rearrange::<i64>(self),
        }
    }
}

/// Gathers the input in logical order, then scatters into the output's layout.
fn rearrange<T: TensorDType>(op: &Rearrange) -> Result<(), OperationError> {
    let data = op.input().to_vec::<T>()?;
    cpu_store_result(op.out(), &data)
}
