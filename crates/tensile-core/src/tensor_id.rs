use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-unique identifier for a tensor view.
///
/// Views derived from one another share a buffer but never an id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(usize);

impl std::fmt::Debug for TensorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

impl TensorId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
