//! Vtable for type-erased private instance operations.
//!
//! This module contains the [`InstanceVtable`], which lets an owner destroy a
//! private instance without knowing its concrete type at the destruction site.
//!
//! This module encapsulates the fields of [`InstanceVtable`] so they cannot be
//! accessed directly. This visibility restriction guarantees the safety
//! invariant: **the vtable's type parameter must match the actual value type
//! stored in the [`InstanceData`]**.
//!
//! # Safety Invariant
//!
//! This invariant is maintained because vtables are created as `&'static`
//! references via [`InstanceVtable::new`], which pairs the function pointers
//! with a specific type `T` at compile time.

use alloc::boxed::Box;
use core::{any::TypeId, ptr::NonNull};

use crate::{instance::data::InstanceData, util::Erased};

/// Vtable for type-erased private instance operations.
///
/// # Safety Invariant
///
/// The field `drop` is guaranteed to point to the function defined below
/// instantiated with the value type `T` that was used to create this
/// [`InstanceVtable`].
pub(crate) struct InstanceVtable {
    /// Gets the [`TypeId`] of the value type that was used to create this
    /// [`InstanceVtable`].
    type_id: fn() -> TypeId,
    /// Drops the [`Box<InstanceData<T>>`] instance pointed to by this pointer.
    drop: unsafe fn(NonNull<InstanceData<Erased>>),
}

impl InstanceVtable {
    /// Creates a new [`InstanceVtable`] for the value type `T`.
    pub(super) const fn new<T: 'static>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<T>,
                drop: drop::<T>,
            }
        }
    }

    /// Gets the [`TypeId`] of the value type that was used to create this
    /// [`InstanceVtable`].
    #[inline]
    pub(super) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Drops the `Box<InstanceData<T>>` instance pointed to by this pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The pointer comes from [`Box<InstanceData<T>>`] via
    ///    [`Box::into_raw`]
    /// 2. This [`InstanceVtable`] must be a vtable for the value type stored
    ///    in the [`InstanceData`].
    /// 3. This method drops the [`Box<InstanceData<T>>`], so the caller must
    ///    ensure that the pointer has not previously been dropped, that it is
    ///    able to transfer ownership of the pointer, and that it will not use
    ///    the pointer after calling this method.
    #[inline]
    pub(super) unsafe fn drop(&self, ptr: NonNull<InstanceData<Erased>>) {
        // SAFETY: We know that `self.drop` points to the function `drop::<T>` below.
        // That function's safety requirements are upheld:
        // 1. Guaranteed by the caller
        // 2. Guaranteed by the caller
        // 3. Guaranteed by the caller
        unsafe {
            (self.drop)(ptr);
        }
    }
}

/// Drops the [`Box<InstanceData<T>>`] instance pointed to by this pointer.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. The pointer comes from [`Box<InstanceData<T>>`] via [`Box::into_raw`]
/// 2. The value type `T` matches the actual value type stored in the
///    [`InstanceData`]
/// 3. This method drops the [`Box<InstanceData<T>>`], so the caller must
///    ensure that the pointer has not previously been dropped, that it is able
///    to transfer ownership of the pointer, and that it will not use the
///    pointer after calling this method.
unsafe fn drop<T: 'static>(ptr: NonNull<InstanceData<Erased>>) {
    let ptr: NonNull<InstanceData<T>> = ptr.cast();
    let ptr = ptr.as_ptr();
    // SAFETY: Our pointer has the correct type as guaranteed by the caller, and it
    // came from a call to `Box::into_raw` as also guaranteed by our caller.
    let boxed = unsafe { Box::from_raw(ptr) };
    core::mem::drop(boxed);
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;

    #[test]
    fn test_instance_vtable_eq() {
        let vtable1 = InstanceVtable::new::<i32>();
        let vtable2 = InstanceVtable::new::<i32>();

        // Both should be the exact same static instance
        assert!(core::ptr::eq(vtable1, vtable2));
        assert!(!core::ptr::eq(vtable1, InstanceVtable::new::<String>()));
    }

    #[test]
    fn test_instance_type_id() {
        let vtable = InstanceVtable::new::<String>();
        assert_eq!(vtable.type_id(), TypeId::of::<String>());
    }
}
