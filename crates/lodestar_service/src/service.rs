//! Type-erased service values.
//!
//! Any `Send + Sync + 'static` type is a [`Service`]. Values flow through the
//! engine as [`Instance`] handles, which are cheap to clone and can be
//! downcast back to their concrete type.

use core::any::TypeId;
use std::sync::Arc;

use downcast_rs::{DowncastSync, impl_downcast};

/// A value that can be provided by the container.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait Service: DowncastSync {}

impl<T: Send + Sync + 'static> Service for T {}

impl_downcast!(sync Service);

/// A shared, type-erased service value.
///
/// Cloning an `Instance` clones the handle, not the value: two clones are
/// [`ptr_eq`](Self::ptr_eq).
///
/// # Example
///
/// ```
/// use lodestar_service::service::Instance;
///
/// let instance = Instance::new(String::from("hello"));
/// let copy = instance.clone();
///
/// assert!(instance.ptr_eq(&copy));
/// assert_eq!(*instance.downcast::<String>().unwrap(), "hello");
/// assert!(instance.downcast::<u32>().is_none());
/// ```
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Service>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Instance {
    /// Wraps a value.
    #[must_use]
    pub fn new<T: Service>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value without copying it.
    #[must_use]
    pub fn from_arc<T: Service>(value: Arc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns the `TypeId` of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped value is a `T`.
    #[must_use]
    pub fn is<T: Service>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Returns a shared handle to the value if it is a `T`.
    #[must_use]
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        if !self.is::<T>() {
            return None;
        }
        Arc::clone(&self.value).downcast_arc::<T>().ok()
    }

    /// Borrows the value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Service>(&self) -> Option<&T> {
        (*self.value).downcast_ref::<T>()
    }

    /// Returns `true` if both handles point at the same value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl core::fmt::Debug for Instance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Instance({})", self.type_name)
    }
}
