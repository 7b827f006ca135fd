use crate::{
    rearrange, DType, Device, DeviceError, Enforcer, InvariantError, MemcpyKind, OperationError,
    Shape, Storage, StridedIterator, Strides, TensorDType, TensorId,
};

use derive_new::new;
use half::{bf16, f16};
use parking_lot::{RwLock, RwLockReadGuard};

use std::sync::Arc;

#[cfg(feature = "rand")]
use {crate::FloatDType, rand::prelude::*, rand_distr::StandardNormal};

#[cfg(feature = "testing")]
use ndarray::{ArrayD, IxDyn};

// thiserror error for Tensor
#[derive(thiserror::Error, Debug)]
pub enum TensorError {
    #[error(transparent)]
    InvariantError(#[from] InvariantError),
    #[error(transparent)]
    DeviceError(#[from] DeviceError),
    #[error(transparent)]
    OperationError(#[from] OperationError),
}

/// A strided view into a shared buffer.
///
/// Cloning a tensor, or deriving a new view with [Tensor::permute], [Tensor::slice] or
/// [Tensor::view], never copies data. The buffer is released when the last view is dropped.
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<Inner>,
}

impl Tensor {
    fn new(view: StorageView, storage: Storage, device: Device) -> Self {
        Self::shared(view, Arc::new(RwLock::new(storage)), device)
    }

    fn shared(view: StorageView, storage: Arc<RwLock<Storage>>, device: Device) -> Self {
        Self {
            inner: Arc::new(Inner::new(view, storage, device)),
        }
    }

    /// A new view over the same buffer.
    fn derive(&self, view: StorageView) -> Self {
        Self::shared(view, self.inner.storage.clone(), self.device)
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = match self.to_vec_f32() {
            Ok(data) => format!("{:?}", data),
            Err(e) => format!("<{}>", e),
        };
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", self.shape())
            .field("strides", self.strides())
            .field("offset", &self.offset())
            .field("dt", &self.dt())
            .field("device", &self.device)
            .field("data", &data)
            .finish()
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl std::ops::Deref for Tensor {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

/// Tensors are just an view into their underlying byte storage.
///
/// `offset` and `strides` are counted in elements, not bytes.
#[derive(new, Debug, Clone, PartialEq)]
pub struct StorageView {
    shape: Shape,
    dt: DType,
    strides: Strides,
    offset: usize,
}

impl StorageView {
    /// A row-major view starting at the beginning of the buffer.
    pub fn contiguous(shape: Shape, dt: DType) -> Self {
        let strides = Strides::from(&shape);
        Self::new(shape, dt, strides, 0)
    }

    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1;
        for (&size, &stride) in self.shape.iter().zip(self.strides.iter()).rev() {
            if stride != expected {
                return false;
            }
            expected *= size as isize;
        }
        true
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dt(&self) -> DType {
        self.dt
    }
}

#[derive(Debug)]
pub struct Inner {
    id: TensorId,
    device: Device,
    view: StorageView,
    storage: Arc<RwLock<Storage>>,
}

impl AsRef<Inner> for Inner {
    fn as_ref(&self) -> &Inner {
        self
    }
}

impl Inner {
    fn new(view: StorageView, storage: Arc<RwLock<Storage>>, device: Device) -> Self {
        Self {
            id: TensorId::new(),
            view,
            device,
            storage,
        }
    }
}

impl Tensor {
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn rank(&self) -> usize {
        self.view.shape.rank()
    }

    pub fn dt(&self) -> DType {
        self.view.dt
    }

    pub fn shape(&self) -> &Shape {
        &self.view.shape
    }

    pub fn strides(&self) -> &Strides {
        &self.view.strides
    }

    pub fn offset(&self) -> usize {
        self.view.offset
    }

    pub fn numel(&self) -> usize {
        self.view.shape.numel()
    }

    pub fn num_bytes(&self) -> usize {
        self.numel() * self.dt().size_of()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn storage(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read()
    }

    /// Number of live views sharing this tensor's buffer.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    pub fn is_contiguous(&self) -> bool {
        self.view.is_contiguous()
    }
}

impl Tensor {
    /// Allocates a zero filled, row-major tensor.
    pub fn create(shape: Shape, dt: DType, device: Device) -> Result<Tensor, TensorError> {
        let n_bytes = shape.numel() * dt.size_of();
        let storage = device.backend().allocate(n_bytes, dt.size_of())?;
        Ok(Tensor::new(StorageView::contiguous(shape, dt), storage, device))
    }

    pub fn zeros<T: TensorDType>(shape: Shape, device: Device) -> Result<Tensor, TensorError> {
        Self::create(shape, T::dt(), device)
    }

    #[cfg(feature = "rand")]
    pub fn randn<T: FloatDType>(shape: Shape, device: Device) -> Result<Tensor, TensorError> {
        let mut rng = rand::thread_rng();
        let data = (0..shape.numel())
            .map(|_| {
                let sample: f32 = StandardNormal.sample(&mut rng);
                T::from_float(sample)
            })
            .collect::<Vec<_>>();
        Self::from_data(data, shape, device)
    }

    /// Creates a new tensor from a chunk of data.
    ///
    /// If a non-CPU device is specified, the data will be copied to the device.
    pub fn from_data<T: TensorDType, U: AsRef<[T]>>(
        data: U,
        shape: Shape,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        let host = Self::create(shape, T::dt(), Device::CPU)?;
        host.load(data.as_ref())?;
        host.to(device)
    }

    /// Overwrites every element, `data` is given in logical (row-major) order.
    pub fn load<T: TensorDType>(&self, data: &[T]) -> Result<(), TensorError> {
        Enforcer::assert_dtype(self, T::dt())?;
        if data.len() != self.numel() {
            return Err(InvariantError::ElementCount {
                expected: self.numel(),
                actual: data.len(),
            }
            .into());
        }
        let mut guard = self.storage.write();
        let buffer = guard.try_cpu_mut()?.as_slice_mut::<T>();
        if self.is_contiguous() {
            buffer[self.offset()..self.offset() + data.len()].copy_from_slice(data);
        } else {
            let indices = StridedIterator::new(self.shape(), self.strides(), self.offset());
            for (index, value) in indices.zip(data) {
                buffer[index] = *value;
            }
        }
        Ok(())
    }

    /// Reads every element in logical (row-major) order.
    pub fn to_vec<T: TensorDType>(&self) -> Result<Vec<T>, TensorError> {
        Enforcer::assert_dtype(self, T::dt())?;
        let guard = self.storage.read();
        let buffer = guard.try_cpu()?.as_slice::<T>();
        if self.is_contiguous() {
            return Ok(buffer[self.offset()..self.offset() + self.numel()].to_vec());
        }
        Ok(StridedIterator::new(self.shape(), self.strides(), self.offset())
            .map(|index| buffer[index])
            .collect())
    }

    /// Reads every element widened to f32, whatever the storage type.
    pub fn to_vec_f32(&self) -> Result<Vec<f32>, TensorError> {
        Ok(match self.dt() {
            DType::F32 => self.to_vec::<f32>()?,
            DType::F16 => self.to_vec::<f16>()?.into_iter().map(f16::to_f32).collect(),
            DType::BF16 => self.to_vec::<bf16>()?.into_iter().map(bf16::to_f32).collect(),
            DType::I32 => self.to_vec::<i32>()?.into_iter().map(|x| x as f32).collect(),
            DType::U32 => self.to_vec::<u32>()?.into_iter().map(|x| x as f32).collect(),
            DType::I64 => self.to_vec::<i64>()?.into_iter().map(|x| x as f32).collect(),
        })
    }

    /// Copies the tensor to `device`, returning a shared view if it is already there.
    pub fn to(&self, device: Device) -> Result<Tensor, TensorError> {
        if self.device == device {
            return Ok(self.clone());
        }
        let src = self.contiguous()?;
        let dt = src.dt();
        let backend = if device.is_cpu() {
            src.device.backend()
        } else {
            device.backend()
        };
        let mut storage = device.backend().allocate(src.num_bytes(), dt.size_of())?;
        backend.copy(
            &mut storage,
            0,
            &src.storage(),
            src.offset() * dt.size_of(),
            src.num_bytes(),
            MemcpyKind::between(src.device, device),
        )?;
        let view = StorageView::contiguous(src.shape().clone(), dt);
        Ok(Tensor::new(view, storage, device))
    }

    /// Fresh buffer holding the same data.
    pub fn deep_clone(&self) -> Result<Tensor, TensorError> {
        let cloned = Self::create(self.shape().clone(), self.dt(), self.device)?;
        rearrange(&cloned, self)?;
        Ok(cloned)
    }
}

/// View manipulation, none of these copy data.
impl Tensor {
    /// Reorders dimensions, `dims[i]` is the source dimension placed at position `i`.
    pub fn permute(&self, dims: &[usize]) -> Result<Tensor, TensorError> {
        Enforcer::check_permutation(dims, self.rank())?;
        let view = StorageView::new(
            self.shape().permuted(dims),
            self.dt(),
            self.strides().permuted(dims),
            self.offset(),
        );
        Ok(self.derive(view))
    }

    /// Narrows `dim` to `start..end`, `start == end` gives an empty view.
    pub fn slice(&self, dim: usize, start: usize, end: usize) -> Result<Tensor, TensorError> {
        let rank = self.rank();
        if dim >= rank {
            return Err(InvariantError::DimOutOfRange { dim, rank }.into());
        }
        let size = self.shape()[dim];
        if start > end || end > size {
            return Err(InvariantError::InvalidSlice {
                dim,
                start,
                end,
                size,
            }
            .into());
        }
        let mut shape = self.shape().clone();
        shape[dim] = end - start;
        let offset = self.offset() as isize + start as isize * self.strides()[dim];
        let view = StorageView::new(shape, self.dt(), self.strides().clone(), offset as usize);
        Ok(self.derive(view))
    }

    /// Reinterprets a contiguous tensor with a new shape of equal element count.
    pub fn view(&self, shape: Shape) -> Result<Tensor, TensorError> {
        if shape.numel() != self.numel() {
            return Err(InvariantError::ElementCount {
                expected: self.numel(),
                actual: shape.numel(),
            }
            .into());
        }
        if self.numel() != 0 && !self.is_contiguous() {
            return Err(InvariantError::IncompatibleView(format!(
                "cannot view {:?} with strides {:?} as {:?}",
                self.shape(),
                self.strides(),
                shape
            ))
            .into());
        }
        let strides = Strides::from(&shape);
        Ok(self.derive(StorageView::new(shape, self.dt(), strides, self.offset())))
    }

    /// Returns `self` if already contiguous, otherwise a row-major copy.
    pub fn contiguous(&self) -> Result<Tensor, TensorError> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        self.deep_clone()
    }

    /// Like [Tensor::view], but copies first when the layout requires it.
    pub fn reshape(&self, shape: Shape) -> Result<Tensor, TensorError> {
        self.contiguous()?.view(shape)
    }
}

#[cfg(feature = "testing")]
impl Tensor {
    pub fn all_close(&self, other: &Self, atol: f32, rtol: f32) -> anyhow::Result<()> {
        if self.shape() != other.shape() {
            anyhow::bail!("Shape mismatch {:?} != {:?}", self.shape(), other.shape())
        }

        let dims = IxDyn(&self.shape().to_vec());
        let self_nd = ArrayD::from_shape_vec(dims.clone(), self.to_vec_f32()?)?;
        let other_nd = ArrayD::from_shape_vec(dims, other.to_vec_f32()?)?;
        let mut stats = CloseStats::new(atol, rtol);

        ndarray::indices_of(&self_nd).into_iter().for_each(|idx| {
            let (a, b) = (self_nd[&idx], other_nd[&idx]);
            stats.update(&a, &b, idx);
        });

        if stats.fail_count > 0 {
            anyhow::bail!(
                "{} samples not close - AVGE={} MAE={} at {:?}",
                stats.fail_count,
                stats.avg_error(),
                stats.max_abs_error,
                stats.max_abs_error_idxs,
            );
        }
        log::info!(
            "All close - AVGE={} MAE={} at {:?}",
            stats.avg_error(),
            stats.max_abs_error,
            stats.max_abs_error_idxs
        );
        Ok(())
    }
}

#[cfg(feature = "testing")]
struct CloseStats {
    total_error: f32,
    max_abs_error: f32,
    max_abs_error_idxs: Option<IxDyn>,
    element_count: usize,
    fail_count: usize,
    atol: f32,
    rtol: f32,
}

#[cfg(feature = "testing")]
impl CloseStats {
    fn new(atol: f32, rtol: f32) -> Self {
        Self {
            total_error: 0.0,
            max_abs_error: 0.0,
            max_abs_error_idxs: None,
            element_count: 0,
            fail_count: 0,
            atol,
            rtol,
        }
    }

    fn update(&mut self, a: &f32, b: &f32, index: IxDyn) {
        let abs_diff = (a - b).abs();
        self.total_error += abs_diff;
        self.element_count += 1;

        if abs_diff > self.max_abs_error {
            self.max_abs_error = abs_diff;
            self.max_abs_error_idxs = Some(index);
        }

        if !self.is_close(a, b, abs_diff) {
            self.fail_count += 1;
        }
    }

    fn avg_error(&self) -> f32 {
        self.total_error / self.element_count.max(1) as f32
    }

    fn is_close(&self, a: &f32, b: &f32, abs_diff: f32) -> bool {
        (a.is_nan() && b.is_nan())
            || (a.is_infinite() && b.is_infinite() && a.signum() == b.signum())
            || abs_diff <= self.atol + self.rtol * b.abs()
    }
}
