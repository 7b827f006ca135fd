use half::{bf16, f16};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Hash)]
pub enum DType {
    F16,
    BF16,
    #[default]
    F32,
    I32,
    U32,
    I64,
}

impl DType {
    /// Returns the size of the type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::F16 => 2,
            DType::BF16 => 2,
            DType::F32 => 4,
            DType::I32 => 4,
            DType::U32 => 4,
            DType::I64 => 8,
        }
    }

    /// Compute dtypes are the ones kernels accumulate over.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32)
    }
}

pub trait TensorDType:
    Copy + std::fmt::Debug + PartialEq + 'static + num_traits::Zero + Send + Sync + bytemuck::Pod
{
    fn dt() -> DType;
}

/// Storage precisions that round-trip through `f32` for accumulation.
///
/// `from_float` is lossy for the half precision types.
pub trait FloatDType: TensorDType {
    fn to_float(self) -> f32;

    fn from_float(value: f32) -> Self;
}

macro_rules! map_type {
    ($t:ty, $v:ident) => {
        impl TensorDType for $t {
            fn dt() -> DType {
                DType::$v
            }
        }
    };
}

macro_rules! map_half_type {
    ($t:ty, $v:ident) => {
        impl TensorDType for $t {
            fn dt() -> DType {
                DType::$v
            }
        }

        impl FloatDType for $t {
            #[inline]
            fn to_float(self) -> f32 {
                self.to_f32()
            }

            #[inline]
            fn from_float(value: f32) -> Self {
                Self::from_f32(value)
            }
        }
    };
}

map_type!(f32, F32);
map_type!(i32, I32);
map_type!(u32, U32);
map_type!(i64, I64);
map_half_type!(f16, F16);
map_half_type!(bf16, BF16);

impl FloatDType for f32 {
    #[inline]
    fn to_float(self) -> f32 {
        self
    }

    #[inline]
    fn from_float(value: f32) -> Self {
        value
    }
}
