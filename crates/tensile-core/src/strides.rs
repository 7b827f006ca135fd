use crate::{rvec, RVec, Shape};

#[derive(Clone, PartialEq, Eq, Default, Hash)]
pub struct Strides(RVec<isize>);

impl Strides {
    pub fn to_vec(&self) -> Vec<isize> {
        self.0.to_vec()
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, isize> {
        self.0.iter()
    }

    pub(crate) fn permuted(&self, dims: &[usize]) -> Self {
        Strides(dims.iter().map(|&d| self.0[d]).collect())
    }
}

impl std::fmt::Debug for Strides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut shape = format!("[{}", self.0.first().unwrap_or(&0));
        for dim in self.0.iter().skip(1) {
            shape.push_str(&format!("x{}", dim));
        }
        write!(f, "{}]", shape)
    }
}

impl std::ops::Index<usize> for Strides {
    type Output = isize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<&Shape> for Strides {
    fn from(shape: &Shape) -> Self {
        let mut strides = rvec![];
        let mut stride = 1;
        for size in shape.inner().iter().rev() {
            strides.push(stride);
            stride *= *size as isize;
        }
        strides.reverse();
        Self(strides)
    }
}

impl From<Vec<isize>> for Strides {
    fn from(strides: Vec<isize>) -> Self {
        Self(strides.into())
    }
}

/// Walks a strided layout in logical (row-major) order, yielding buffer element indices.
#[derive(Debug, Clone)]
pub struct StridedIterator<'a> {
    shape: &'a Shape,
    strides: &'a Strides,
    coords: RVec<usize>,
    next: Option<isize>,
}

impl<'a> StridedIterator<'a> {
    pub fn new(shape: &'a Shape, strides: &'a Strides, offset: usize) -> Self {
        assert_eq!(shape.rank(), strides.rank());
        let next = if shape.numel() == 0 {
            None
        } else {
            Some(offset as isize)
        };
        Self {
            shape,
            strides,
            coords: rvec![0; shape.rank()],
            next,
        }
    }
}

impl Iterator for StridedIterator<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let mut index = current;
        self.next = None;
        for dim in (0..self.shape.rank()).rev() {
            self.coords[dim] += 1;
            if self.coords[dim] < self.shape[dim] {
                index += self.strides[dim];
                self.next = Some(index);
                break;
            }
            index -= self.strides[dim] * (self.shape[dim] as isize - 1);
            self.coords[dim] = 0;
        }
        Some(current as usize)
    }
}
