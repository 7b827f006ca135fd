use half::{bf16, f16};

use crate::{CPUOperation, DType, Embedding, InvariantError, OperationError, TensorDType};

use super::cpu_store_result;

impl CPUOperation for Embedding {
    fn apply_cpu(&self) -> Result<(), OperationError> {
        match self.weight().dt() {
            DType::F32 => embedding::<f32>(self),
            DType::F16 => embedding::<f16>(self),
            DType::BF16 => embedding::<bf16>(self),
            dt => Err(InvariantError::UnsupportedDType(dt).into()),
        }
    }
}

fn embedding<T: TensorDType>(op: &Embedding) -> Result<(), OperationError> {
    let [vocab, hidden]: [usize; 2] = op.weight().shape().try_into()?;
    let indices = op.index().to_vec::<i64>()?;
    // Validate everything first, a bad index must not leave a half written output.
    let rows = indices
        .iter()
        .map(|&index| match usize::try_from(index) {
            Ok(row) if row < vocab => Ok(row),
            _ => Err(OperationError::IndexOutOfRange {
                index,
                bound: vocab,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Only the selected rows leave the table. The guard is released before the write.
    let mut out = Vec::with_capacity(rows.len() * hidden);
    {
        let guard = op.weight().storage();
        let table = &guard.try_cpu()?.as_slice::<T>()[op.weight().offset()..];
        for row in rows {
            out.extend_from_slice(&table[row * hidden..(row + 1) * hidden]);
        }
    }
    cpu_store_result(op.out(), &out)
}
