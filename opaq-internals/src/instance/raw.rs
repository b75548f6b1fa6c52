//! Type-erased private instance pointer types.
//!
//! This module encapsulates the `ptr` field of [`RawInstance`],
//! [`RawInstanceRef`] and [`RawInstanceMut`], ensuring it is only visible
//! within this module. This visibility restriction guarantees the safety
//! invariant: **the pointer always comes from `Box<InstanceData<T>>`**, either
//! directly through [`RawInstance::new`] or through a pointer handed out by
//! [`RawInstance::into_value_ptr`] and given back to
//! [`RawInstance::from_value_ptr`].
//!
//! # Verification
//!
//! Every operation that frees the allocation first reads the [`Sentinel`] at
//! its head. If the sentinel is not intact the operation panics and leaks the
//! allocation instead of handing a foreign pointer to the allocator.
//!
//! # Type Erasure
//!
//! The concrete type parameter `T` is erased by casting to
//! `InstanceData<Erased>`. The vtable stored within the `InstanceData` knows
//! how to destroy the real `T`.

use alloc::boxed::Box;
use core::{any::TypeId, marker::PhantomData, mem::ManuallyDrop, ptr::NonNull};

use crate::{
    instance::data::InstanceData,
    sentinel::{MAGIC, Sentinel},
    util::Erased,
};

/// A pointer to an [`InstanceData`] that is guaranteed to point to an
/// initialized instance of an [`InstanceData<T>`] for some specific `T`,
/// though we do not know which actual `T` it is.
///
/// However, the pointer is allowed to transition into a non-initialized state
/// inside the [`RawInstance::drop`] method.
///
/// The pointer is guaranteed to have been created using [`Box::into_raw`].
///
/// We cannot use a [`Box<InstanceData<T>>`] directly, because that does not
/// allow us to type-erase the `T`.
#[repr(transparent)]
pub struct RawInstance {
    /// Pointer to the inner instance data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer must have been created from a `Box<InstanceData<T>>` for
    ///    some `T` using `Box::into_raw`.
    /// 2. The pointer will point to the same `InstanceData<T>` for the entire
    ///    lifetime of this object.
    /// 3. The pointee is properly initialized for the entire lifetime of this
    ///    object, except during the execution of the `Drop` implementation.
    /// 4. No other `RawInstance` points to the same allocation.
    ptr: NonNull<InstanceData<Erased>>,
}

impl RawInstance {
    /// Allocates a new [`RawInstance`] holding the given value.
    ///
    /// The sentinel is written as part of the allocation. No verification is
    /// performed here; it happens when the instance is destroyed.
    #[inline]
    pub fn new<T: 'static>(value: T) -> Self {
        let ptr = Box::new(InstanceData::new(value));
        let ptr: *mut InstanceData<T> = Box::into_raw(ptr);
        let ptr: *mut InstanceData<Erased> = ptr.cast::<InstanceData<Erased>>();

        // SAFETY: `Box::into_raw` returns a non-null pointer
        let ptr: NonNull<InstanceData<Erased>> = unsafe { NonNull::new_unchecked(ptr) };

        Self { ptr }
    }

    /// Returns a reference to the [`InstanceData`] instance.
    #[inline]
    pub fn as_ref(&self) -> RawInstanceRef<'_> {
        RawInstanceRef {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Returns a mutable reference to the [`InstanceData`] instance.
    #[inline]
    pub fn as_mut(&mut self) -> RawInstanceMut<'_> {
        RawInstanceMut {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Verifies the sentinel and destroys the instance through its vtable.
    ///
    /// This does the same as dropping the [`RawInstance`], except that a
    /// verification failure is reported at the caller's location.
    ///
    /// # Panics
    ///
    /// Panics in checked builds if the sentinel is not intact. The allocation
    /// is leaked in that case.
    #[track_caller]
    #[inline]
    pub fn destroy(self) {
        let this = ManuallyDrop::new(self);
        this.as_ref().verify();
        let vtable = this.as_ref().vtable();

        // SAFETY:
        // 1. The pointer comes from `Box::into_raw` (guaranteed by the invariants on
        //    this type)
        // 2. The vtable returned by `this.as_ref().vtable()` is guaranteed to match
        //    the data in the `InstanceData`.
        // 3. `this` is never dropped, so this is the only place the allocation is
        //    freed and the pointer is not used afterwards.
        unsafe {
            vtable.drop(this.ptr);
        }
    }

    /// Verifies the sentinel, frees the allocation and returns the stored
    /// value.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The type `T` matches the actual value type stored in the
    ///    [`InstanceData`].
    ///
    /// # Panics
    ///
    /// Panics in checked builds if the sentinel is not intact. The allocation
    /// is leaked in that case.
    #[track_caller]
    #[inline]
    pub unsafe fn into_value_unchecked<T: 'static>(self) -> T {
        let this = ManuallyDrop::new(self);
        this.as_ref().verify();
        debug_assert_eq!(this.as_ref().vtable().type_id(), TypeId::of::<T>());

        let ptr: *mut InstanceData<T> = this.ptr.cast::<InstanceData<T>>().as_ptr();
        // SAFETY: The pointer came from `Box::into_raw` on a `Box<InstanceData<T>>`,
        // where `T` matches as guaranteed by our caller. `this` is never dropped,
        // so ownership is transferred exactly once.
        let boxed: Box<InstanceData<T>> = unsafe { Box::from_raw(ptr) };
        boxed.into_value()
    }

    /// Gives up ownership of the allocation without destroying it and returns
    /// a pointer to the stored value.
    ///
    /// The allocation stays alive until the pointer is handed back to
    /// [`RawInstance::from_value_ptr`] and the resulting [`RawInstance`] is
    /// dropped. No verification is performed.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The type `T` matches the actual value type stored in the
    ///    [`InstanceData`].
    #[inline]
    #[must_use]
    pub unsafe fn into_value_ptr<T: 'static>(self) -> NonNull<T> {
        let this = ManuallyDrop::new(self);
        debug_assert_eq!(this.as_ref().vtable().type_id(), TypeId::of::<T>());

        let ptr: NonNull<InstanceData<T>> = this.ptr.cast::<InstanceData<T>>();
        // SAFETY: `ptr` points to a live `InstanceData<T>` as guaranteed by the
        // invariants on this type and by our caller.
        unsafe { InstanceData::value_ptr(ptr) }
    }

    /// Takes back ownership of an allocation previously given up with
    /// [`RawInstance::into_value_ptr`].
    ///
    /// The sentinel is not checked here. A pointer that did not come from
    /// [`RawInstance::into_value_ptr`] is caught, in checked builds, when the
    /// returned [`RawInstance`] is destroyed.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`RawInstance::into_value_ptr::<T>`], with the
    ///    same `T`.
    /// 2. No other [`RawInstance`] has been created from `ptr` since then.
    ///
    /// [`RawInstance::into_value_ptr::<T>`]: RawInstance::into_value_ptr
    #[inline]
    pub unsafe fn from_value_ptr<T: 'static>(ptr: NonNull<T>) -> Self {
        // SAFETY: `ptr` came from `InstanceData::value_ptr` through
        // `into_value_ptr`, as guaranteed by our caller.
        let ptr: NonNull<InstanceData<T>> = unsafe { InstanceData::from_value_ptr(ptr) };

        // SAFETY: We must uphold the safety invariants of the ptr field:
        // 1. The allocation was created by `RawInstance::new` (guaranteed by caller)
        // 2. We never change the pointer
        // 3. `into_value_ptr` did not free or deinitialize the allocation
        // 4. Guaranteed by caller
        Self {
            ptr: ptr.cast::<InstanceData<Erased>>(),
        }
    }
}

impl core::ops::Drop for RawInstance {
    #[inline]
    fn drop(&mut self) {
        self.as_ref().verify();
        let vtable = self.as_ref().vtable();

        // SAFETY:
        // 1. The pointer comes from `Box::into_raw` (guaranteed by the invariants on
        //    this type)
        // 2. The vtable returned by `self.as_ref().vtable()` is guaranteed to match
        //    the data in the `InstanceData`.
        // 3. The pointer is initialized and has not been previously freed as
        //    guaranteed by the invariants on this type. We are correctly
        //    transferring ownership here and the pointer is not used afterwards, as
        //    we are in the drop function.
        unsafe {
            vtable.drop(self.ptr);
        }
    }
}

/// A lifetime-bound pointer to an [`InstanceData`] that is guaranteed to point
/// to an initialized instance of an [`InstanceData<T>`] for some specific `T`,
/// though we do not know which actual `T` it is.
///
/// We cannot use a [`&'a InstanceData<T>`] directly, because that would
/// require us to know the actual type of the value, which we do not.
///
/// [`&'a InstanceData<T>`]: InstanceData
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct RawInstanceRef<'a> {
    /// Pointer to the inner instance data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer must have been created from a `Box<InstanceData<T>>` for
    ///    some `T` using `Box::into_raw`.
    /// 2. The pointer will point to the same `InstanceData<T>` for the entire
    ///    lifetime of this object.
    ptr: NonNull<InstanceData<Erased>>,

    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a InstanceData<Erased>`
    _marker: PhantomData<&'a InstanceData<Erased>>,
}

impl<'a> RawInstanceRef<'a> {
    /// Casts the [`RawInstanceRef`] to an [`InstanceData<T>`] pointer.
    #[inline]
    pub(super) fn cast_inner<T: 'static>(self) -> NonNull<InstanceData<T>> {
        self.ptr.cast::<InstanceData<T>>()
    }

    /// Returns a raw pointer to the [`InstanceData`] instance.
    #[inline]
    pub(super) fn as_ptr(self) -> *const InstanceData<Erased> {
        self.ptr.as_ptr()
    }

    /// Returns the [`TypeId`] of the stored value.
    #[inline]
    pub fn value_type_id(self) -> TypeId {
        self.vtable().type_id()
    }

    /// Returns `true` if the sentinel at the head of the allocation is intact.
    ///
    /// Always `true` in unchecked builds.
    #[inline]
    pub fn is_intact(self) -> bool {
        self.sentinel().is_intact()
    }

    /// Asserts that the sentinel at the head of the allocation is intact.
    ///
    /// Does nothing in unchecked builds.
    ///
    /// # Panics
    ///
    /// Panics if the sentinel does not hold [`MAGIC`].
    #[track_caller]
    #[inline]
    pub fn verify(self) {
        let sentinel = self.sentinel();
        if !sentinel.is_intact() {
            verification_failed(self.ptr, sentinel);
        }
    }
}

/// Reports a sentinel mismatch and panics.
///
/// The vtable is deliberately not consulted: an allocation with a broken
/// sentinel cannot be trusted to have a valid one.
#[cold]
#[inline(never)]
#[track_caller]
fn verification_failed(ptr: NonNull<InstanceData<Erased>>, sentinel: Sentinel) -> ! {
    tracing::error!(
        address = ?ptr,
        expected = MAGIC,
        found = ?sentinel.value(),
        "private instance failed sentinel verification"
    );
    panic!(
        "private instance at {ptr:p} failed sentinel verification: expected {MAGIC:#010x}, found \
         {:#010x?}",
        sentinel.value()
    );
}

/// A mutable lifetime-bound pointer to an [`InstanceData`] that is guaranteed
/// to point to an initialized instance of an [`InstanceData<T>`] for some
/// specific `T`, though we do not know which actual `T` it is.
///
/// We cannot use a [`&'a mut InstanceData<T>`] directly, because that would
/// require us to know the actual type of the value, which we do not.
///
/// [`&'a mut InstanceData<T>`]: InstanceData
#[repr(transparent)]
pub struct RawInstanceMut<'a> {
    /// Pointer to the inner instance data
    ///
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer must have been created from a `Box<InstanceData<T>>` for
    ///    some `T` using `Box::into_raw`.
    /// 2. The pointer will point to the same `InstanceData<T>` for the entire
    ///    lifetime of this object.
    /// 3. This pointer represents exclusive access to the `InstanceData`.
    ptr: NonNull<InstanceData<Erased>>,

    /// Marker to tell the compiler that we should
    /// behave the same as a `&'a mut InstanceData<Erased>`
    _marker: PhantomData<&'a mut InstanceData<Erased>>,
}

impl<'a> RawInstanceMut<'a> {
    /// Casts the [`RawInstanceMut`] to an [`InstanceData<T>`] pointer.
    #[inline]
    pub(super) fn cast_inner<T: 'static>(self) -> NonNull<InstanceData<T>> {
        self.ptr.cast::<InstanceData<T>>()
    }

    /// Returns a raw mutable pointer to the [`InstanceData`] instance.
    #[cfg(all(test, any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
    #[inline]
    pub(super) fn into_mut_ptr(self) -> *mut InstanceData<Erased> {
        self.ptr.as_ptr()
    }

    /// Reborrows the mutable reference, returning a new [`RawInstanceMut`]
    /// with a shorter lifetime.
    #[inline]
    pub fn reborrow<'b>(&'b mut self) -> RawInstanceMut<'b> {
        RawInstanceMut {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Returns a shared reference to the [`InstanceData`] instance.
    #[inline]
    pub fn as_ref(&self) -> RawInstanceRef<'_> {
        RawInstanceRef {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}
