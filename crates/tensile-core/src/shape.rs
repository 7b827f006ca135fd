use crate::RVec;

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(RVec<usize>);

impl Shape {
    pub fn new(shape: RVec<usize>) -> Self {
        Self(shape)
    }

    pub fn inner(&self) -> &RVec<usize> {
        &self.0
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rank(&self) -> usize {
        self.len()
    }

    /// True if any dimension is zero, i.e the shape describes no elements.
    pub fn has_zero_dim(&self) -> bool {
        self.0.iter().any(|&d| d == 0)
    }

    /// Reorders the dimensions, `dims[i]` names the source dimension placed at `i`.
    ///
    /// The caller must have validated `dims` as a permutation of `0..rank`.
    pub(crate) fn permuted(&self, dims: &[usize]) -> Self {
        Shape(dims.iter().map(|&d| self.0[d]).collect())
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut shape = format!("[{}", self.0.first().unwrap_or(&0));
        for dim in self.0.iter().skip(1) {
            shape.push_str(&format!("x{}", dim));
        }
        write!(f, "{}]", shape)
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::ops::Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl std::ops::IndexMut<usize> for Shape {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(shape: Vec<usize>) -> Self {
        Self(shape.into())
    }
}

impl From<&[usize]> for Shape {
    fn from(slice: &[usize]) -> Self {
        Shape(slice.into())
    }
}

macro_rules! impl_try_into_for_shape {
    ($($N:expr),*) => {
        $(
            impl TryInto<[usize; $N]> for &Shape {
                type Error = anyhow::Error;

                fn try_into(self) -> Result<[usize; $N], Self::Error> {
                    if self.0.len() == $N {
                        let mut arr = [0; $N];
                        for (i, &item) in self.0.iter().enumerate().take($N) {
                            arr[i] = item;
                        }
                        Ok(arr)
                    } else {
                        let len = self.0.len();
                        Err(anyhow::anyhow!("Shape has length {} but expected {}", len, $N))
                    }
                }
            }
        )*
    };
}

impl_try_into_for_shape!(0, 1, 2, 3, 4);
