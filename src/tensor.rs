//! Shared parameter tensors and logical device placement

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// Logical memory placement for tensors and optimizer state.
///
/// The crate models the ownership protocol around device memory (evict fully
/// before reclaiming, rebuild before reuse) without binding to a particular
/// accelerator backend; backends interpret the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Host,
    Accelerator,
}

impl Device {
    /// Release cached allocations held on this device.
    ///
    /// Invoked during resource-exhaustion recovery, after all live state has
    /// been moved to host memory. A no-op for `Host`.
    pub fn reclaim(self) {
        if self == Device::Accelerator {
            tracing::debug!("reclaiming accelerator memory");
        }
    }
}

#[derive(Debug)]
struct TensorInner {
    data: Array1<f32>,
    grad: Option<Array1<f32>>,
    requires_grad: bool,
    device: Device,
}

/// A 1-D parameter tensor with an optional gradient buffer.
///
/// Cloning a `Tensor` clones the handle, not the storage: the model and the
/// optimizer's parameter groups observe the same buffers. All mutation goes
/// through interior mutability on the shared handle.
#[derive(Clone, Debug)]
pub struct Tensor {
    inner: Rc<RefCell<TensorInner>>,
}

impl Tensor {
    /// Create a tensor of zeros
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::from_array(Array1::zeros(len), requires_grad)
    }

    /// Create a tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::from_array(Array1::from_vec(data), requires_grad)
    }

    /// Create a tensor from an ndarray
    pub fn from_array(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TensorInner {
                data,
                grad: None,
                requires_grad,
                device: Device::Host,
            })),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.inner.borrow().data.len()
    }

    /// True if the tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the data buffer
    pub fn data(&self) -> Ref<'_, Array1<f32>> {
        Ref::map(self.inner.borrow(), |t| &t.data)
    }

    /// Mutably borrow the data buffer
    pub fn data_mut(&self) -> RefMut<'_, Array1<f32>> {
        RefMut::map(self.inner.borrow_mut(), |t| &mut t.data)
    }

    /// Copy the data out as a vector
    pub fn to_vec(&self) -> Vec<f32> {
        self.inner.borrow().data.to_vec()
    }

    /// Overwrite the data buffer. The length must match.
    pub fn set_data(&self, data: Array1<f32>) {
        let mut inner = self.inner.borrow_mut();
        debug_assert_eq!(inner.data.len(), data.len());
        inner.data = data;
    }

    /// Current gradient, if any (copied out)
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.inner.borrow().grad.clone()
    }

    /// Replace the gradient buffer
    pub fn set_grad(&self, grad: Array1<f32>) {
        self.inner.borrow_mut().grad = Some(grad);
    }

    /// Add into the gradient buffer, initializing it if absent
    pub fn accumulate_grad(&self, delta: &Array1<f32>) {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.grad {
            Some(g) => *g += delta,
            None => inner.grad = Some(delta.clone()),
        }
    }

    /// Drop the gradient buffer
    pub fn zero_grad(&self) {
        self.inner.borrow_mut().grad = None;
    }

    /// Whether this tensor participates in optimization
    pub fn requires_grad(&self) -> bool {
        self.inner.borrow().requires_grad
    }

    /// Current placement
    pub fn device(&self) -> Device {
        self.inner.borrow().device
    }

    /// Move this tensor (data and gradient) to the given placement.
    ///
    /// The move is complete when this returns; nothing retains a reference to
    /// the previous placement.
    pub fn to_device(&self, device: Device) {
        self.inner.borrow_mut().device = device;
    }

    /// True if two handles share storage
    pub fn same_storage(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
