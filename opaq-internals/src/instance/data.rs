//! This module encapsulates the fields of the [`InstanceData`]. Since this is
//! the only place they are visible, the [`InstanceVtable`] is guaranteed to
//! always be in sync with the type of the stored value, and the [`Sentinel`]
//! is guaranteed to only ever be written by [`InstanceData::new`] (and by tests
//! that deliberately corrupt it).

use core::{any::TypeId, ptr::NonNull};

use crate::{
    instance::{
        raw::{RawInstanceMut, RawInstanceRef},
        vtable::InstanceVtable,
    },
    sentinel::Sentinel,
};

/// Type-erased private instance allocation.
///
/// This struct uses `#[repr(C)]` so the header fields sit at the same offsets
/// for every `T`. The sentinel is first: it can be read through a pointer
/// whose value type is unknown, and even through a pointer that was never an
/// `InstanceData` at all, without trusting anything else in the allocation.
#[repr(C)]
pub(super) struct InstanceData<T: 'static> {
    /// Verification marker, written once on construction
    sentinel: Sentinel,
    /// The Vtable of this instance
    vtable: &'static InstanceVtable,
    /// The private instance itself
    value: T,
}

impl<T: 'static> InstanceData<T> {
    /// Creates a new [`InstanceData`] around the given value.
    ///
    /// The sentinel is initialized before the value is moved in, so it is in
    /// place by the time anyone can observe the allocation.
    #[inline]
    pub(super) fn new(value: T) -> Self {
        Self {
            sentinel: Sentinel::new(),
            vtable: InstanceVtable::new::<T>(),
            value,
        }
    }

    /// Consumes the [`InstanceData`] and returns the stored value.
    #[inline]
    pub(super) fn into_value(self) -> T {
        self.value
    }

    /// Projects a pointer to the allocation onto a pointer to its value.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `this` points to a live `InstanceData<T>`.
    #[inline]
    pub(super) unsafe fn value_ptr(this: NonNull<Self>) -> NonNull<T> {
        let this = this.as_ptr();
        // SAFETY: The pointer is dereferenceable as guaranteed by the caller, so
        // projecting to one of its fields stays in bounds. No reference to the
        // allocation is created.
        let value: *mut T = unsafe { &raw mut (*this).value };

        // SAFETY: A field pointer into a live allocation is never null.
        unsafe { NonNull::new_unchecked(value) }
    }

    /// Recovers a pointer to the allocation from a pointer to its value.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `value` was obtained from [`InstanceData::value_ptr`] on a live
    ///    `InstanceData<T>`.
    #[inline]
    pub(super) unsafe fn from_value_ptr(value: NonNull<T>) -> NonNull<Self> {
        let offset = core::mem::offset_of!(InstanceData<T>, value);
        let this: *mut Self = value.as_ptr().wrapping_byte_sub(offset).cast::<Self>();

        // SAFETY: The value lies `offset` bytes into an allocation, as
        // guaranteed by the caller, so the start of that allocation is not null.
        unsafe { NonNull::new_unchecked(this) }
    }
}

impl<'a> RawInstanceRef<'a> {
    /// Returns a copy of the [`Sentinel`] at the head of the allocation.
    ///
    /// This is the only read that does not rely on the pointer being a live
    /// private instance; it is what the verification in
    /// [`RawInstanceRef::verify`] is built on.
    #[inline]
    pub fn sentinel(self) -> Sentinel {
        let ptr = self.as_ptr();
        // SAFETY: We don't know the actual value type, but the pointer points to
        // an `InstanceData<T>` for some `T`. Since `InstanceData<T>` is
        // `#[repr(C)]`, the sentinel sits at offset zero for every `T` and it is
        // safe to create a pointer to it.
        //
        // We take care not to create a reference to the `InstanceData` itself,
        // as that would be undefined behavior since we don't have the right type.
        let sentinel_ptr: *const Sentinel = unsafe { &raw const (*ptr).sentinel };

        // SAFETY: Reading the `Sentinel` out is valid for the same reasons.
        unsafe { *sentinel_ptr }
    }

    /// Returns a reference to the [`InstanceVtable`] of the [`InstanceData`]
    /// instance.
    #[inline]
    pub(super) fn vtable(self) -> &'static InstanceVtable {
        let ptr = self.as_ptr();
        // SAFETY: Same reasoning as in `sentinel`: `InstanceData<T>` is
        // `#[repr(C)]` and the vtable lies in front of the value, so its
        // offset does not depend on `T`.
        let vtable_ptr: *const &'static InstanceVtable = unsafe { &raw const (*ptr).vtable };

        // SAFETY: Deferencing the pointer and getting out the `&'static
        // InstanceVtable` is valid for the same reasons
        unsafe { *vtable_ptr }
    }

    /// Accesses the stored value as a reference to the specified type.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the type `T` matches the actual value type
    /// stored in the [`InstanceData`].
    #[inline]
    pub unsafe fn value_downcast_unchecked<T: 'static>(self) -> &'a T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.vtable().type_id(), TypeId::of::<T>());

        let this = self.cast_inner::<T>();
        // SAFETY: The pointer is non-null, aligned and points to an initialized
        // `InstanceData<T>`, where `T` matches as guaranteed by our caller.
        // Shared access for `'a` is allowed by the `RawInstanceRef<'a>` itself.
        let this: &'a InstanceData<T> = unsafe { this.as_ref() };
        &this.value
    }
}

impl<'a> RawInstanceMut<'a> {
    /// Accesses the stored value as a mutable reference to the specified type.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the type `T` matches the actual value type
    /// stored in the [`InstanceData`].
    #[inline]
    pub unsafe fn value_downcast_unchecked<T: 'static>(self) -> &'a mut T {
        // Debug assertion to catch type mismatches in case of bugs
        debug_assert_eq!(self.as_ref().vtable().type_id(), TypeId::of::<T>());

        let mut this = self.cast_inner::<T>();
        // SAFETY: The pointer is non-null, aligned and points to an initialized
        // `InstanceData<T>`, where `T` matches as guaranteed by our caller.
        // Exclusive access for `'a` is guaranteed by the `RawInstanceMut<'a>`.
        let this: &'a mut InstanceData<T> = unsafe { this.as_mut() };
        &mut this.value
    }

    /// Overwrites the sentinel, simulating a foreign or stale allocation.
    #[cfg(all(test, any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
    pub(super) fn overwrite_sentinel(self, sentinel: Sentinel) {
        let ptr = self.into_mut_ptr();
        // SAFETY: The sentinel sits at offset zero of every `InstanceData<T>`
        // and we have exclusive access to the allocation.
        let sentinel_ptr: *mut Sentinel = unsafe { &raw mut (*ptr).sentinel };

        // SAFETY: The pointer is valid for writes for the same reasons.
        unsafe { sentinel_ptr.write(sentinel) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_field_offsets() {
        use core::mem::{offset_of, size_of};

        #[repr(align(32))]
        struct LargeAlignment {
            _value: u8,
        }

        assert_eq!(offset_of!(InstanceData<u8>, sentinel), 0);
        assert_eq!(offset_of!(InstanceData<u32>, sentinel), 0);
        assert_eq!(offset_of!(InstanceData<[u64; 4]>, sentinel), 0);
        assert_eq!(offset_of!(InstanceData<LargeAlignment>, sentinel), 0);

        assert_eq!(
            offset_of!(InstanceData<u8>, vtable),
            offset_of!(InstanceData<LargeAlignment>, vtable)
        );

        assert!(
            offset_of!(InstanceData<u8>, value)
                >= size_of::<Sentinel>() + size_of::<&'static InstanceVtable>()
        );
        assert!(
            offset_of!(InstanceData<LargeAlignment>, value)
                >= size_of::<Sentinel>() + size_of::<&'static InstanceVtable>()
        );
    }

    #[test]
    fn test_value_ptr_round_trip() {
        let mut data = InstanceData::new(7_u64);
        let this = NonNull::from(&mut data);

        // SAFETY: `this` points to a live `InstanceData<u64>`.
        let value = unsafe { InstanceData::value_ptr(this) };
        // SAFETY: `value` came from `value_ptr` on the same allocation.
        let back = unsafe { InstanceData::from_value_ptr(value) };

        assert_eq!(back, this);
        // SAFETY: `value` points to the live `u64` inside `data`.
        assert_eq!(unsafe { *value.as_ptr() }, 7);
    }
}
