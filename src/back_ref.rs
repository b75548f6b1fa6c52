//! Back-references from a private implementation to its public type.
//!
//! A public type owns its private instance through a
//! [`PrivatePtr`](crate::PrivatePtr). When the private instance needs to call
//! back into the public type, it embeds a [`Private`] pointing at its owner.
//! The back-reference is a plain non-owning pointer: the public type always
//! outlives the instance it owns, so no reference counting is needed, but the
//! compiler cannot check this, which is why dereferencing it is `unsafe`.
//!
//! The back-reference stays valid only while the public value does not move.
//! [`pin_public`] takes care of this for the common case of a public type that
//! is heap-allocated from the start, returning a [`PublicBox`] that keeps it in
//! place.

use alloc::boxed::Box;
use core::{fmt, ops::Deref, pin::Pin, ptr::NonNull};

use crate::{PrivatePtr, capability::PrivateImpl};

/// Non-owning pointer from a private implementation back to its public type
/// `P`.
///
/// The pointer is fixed when the [`Private`] is constructed and cannot be
/// reseated afterwards.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
///
/// use opaq::{Private, PrivateImpl, PrivatePtr, PublicBox, pin_public};
///
/// pub struct Button {
///     d: PrivatePtr<Instance>,
///     clicks: Cell<u32>,
/// }
///
/// struct Instance {
///     base: Private<Button>,
///     label: String,
/// }
///
/// impl PrivateImpl for Instance {}
///
/// impl Instance {
///     fn press(&self) {
///         // SAFETY: The button owns this instance and is pinned, so it is alive
///         // and has not moved. It is only borrowed shared while we run.
///         let button = unsafe { self.base.public() };
///         button.clicks.set(button.clicks.get() + 1);
///     }
/// }
///
/// impl Button {
///     pub fn new(label: &str) -> PublicBox<Self> {
///         let button = Button {
///             d: PrivatePtr::null(),
///             clicks: Cell::new(0),
///         };
///         pin_public(
///             button,
///             |button| &mut button.d,
///             |base| Instance {
///                 base,
///                 label: label.to_owned(),
///             },
///         )
///     }
///
///     pub fn press(&self) {
///         self.d.press();
///     }
/// }
///
/// let button = Button::new("ok");
/// button.press();
/// button.press();
/// assert_eq!(button.clicks.get(), 2);
/// assert_eq!(button.d.label, "ok");
/// ```
pub struct Private<P> {
    /// Pointer to the public value that owns the private instance
    public: NonNull<P>,
}

impl<P> Private<P> {
    /// Creates a back-reference to a pinned public value.
    #[inline]
    #[must_use]
    pub fn new(public: Pin<&P>) -> Self {
        Self {
            public: NonNull::from(public.get_ref()),
        }
    }

    /// Creates a back-reference from a raw pointer to the public value.
    ///
    /// This is useful while the public value is still being constructed and
    /// no reference to it can be formed yet.
    #[inline]
    #[must_use]
    pub const fn from_ptr(public: NonNull<P>) -> Self {
        Self { public }
    }

    /// Returns the stored pointer to the public value.
    #[inline]
    #[must_use]
    pub const fn public_ptr(&self) -> NonNull<P> {
        self.public
    }

    /// Returns a shared reference to the public value.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The public value is alive and has not moved since this
    ///    [`Private`] was created. This holds while the public value owns the
    ///    private instance and stays pinned.
    /// 2. The public value is not mutably borrowed for as long as the returned
    ///    reference is used. Calls that arrive through `&self` methods of the
    ///    public type satisfy this; calls that arrive through `&mut self`
    ///    methods do not.
    #[inline]
    #[must_use]
    pub unsafe fn public(&self) -> &P {
        // SAFETY: The pointer is non-null and was created from a valid `&P`
        // or `NonNull<P>`. Liveness, address stability and the absence of
        // mutable borrows are guaranteed by the caller.
        unsafe { self.public.as_ref() }
    }
}

impl<P> fmt::Debug for Private<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Private")
            .field("public", &self.public)
            .finish()
    }
}

/// Owning handle to a public value that sits at a fixed heap address.
///
/// Returned by [`pin_public`]. The value is never moved while the handle
/// exists and is dropped together with the handle, so back-references created
/// for it stay valid for the handle's whole life.
///
/// Unlike [`Box`], the handle only ever hands out shared access to the value.
/// Back-references obtained through [`Private::public`] alias it freely.
pub struct PublicBox<P> {
    /// # Safety
    ///
    /// The following safety invariants are guaranteed to be upheld as long as
    /// this struct exists:
    ///
    /// 1. The pointer was created from a `Box<P>` using `Box::into_raw`.
    /// 2. The pointee is initialized and owned by this handle alone.
    /// 3. No `&mut P` derived from the pointer is alive.
    ptr: NonNull<P>,
}

impl<P> PublicBox<P> {
    /// Moves `public` to the heap.
    #[inline]
    fn new(public: P) -> Self {
        let ptr: *mut P = Box::into_raw(Box::new(public));
        // SAFETY: `Box::into_raw` returns a non-null pointer
        let ptr: NonNull<P> = unsafe { NonNull::new_unchecked(ptr) };
        Self { ptr }
    }

    /// Returns the address of the public value.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<P> {
        self.ptr
    }

    /// Returns a pinned shared reference to the public value.
    #[inline]
    #[must_use]
    pub fn as_pin(&self) -> Pin<&P> {
        // SAFETY: The value lives at a fixed address until the handle drops it
        // and is never moved out.
        unsafe { Pin::new_unchecked(&**self) }
    }
}

impl<P> Deref for PublicBox<P> {
    type Target = P;

    #[inline]
    fn deref(&self) -> &P {
        // SAFETY: The pointee is initialized and owned by this handle, and no
        // mutable reference to it is alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl<P> Drop for PublicBox<P> {
    fn drop(&mut self) {
        // SAFETY: The pointer came from `Box::into_raw` and is owned by this
        // handle alone. It is not used afterwards.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl<P: fmt::Debug> fmt::Debug for PublicBox<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: The handle owns its value exactly like a `Box<P>` does.
unsafe impl<P: Send> Send for PublicBox<P> {}

// SAFETY: A shared handle only gives out `&P`.
unsafe impl<P: Sync> Sync for PublicBox<P> {}

/// Moves `public` to a fixed heap address and installs its private instance.
///
/// `slot` selects the [`PrivatePtr`] field of the public value and `init`
/// builds the private instance from a [`Private`] that already points at the
/// final location. Any instance previously held in the slot is destroyed.
///
/// `init` must not dereference the back-reference it receives: the private
/// instance is not installed yet at that point. The private instance's
/// destructor must not dereference it either, since the public value is
/// being dropped by then.
///
/// If `init` or the installation panics, the public value is dropped.
///
/// See [`Private`] for an example.
#[track_caller]
pub fn pin_public<P, T>(
    public: P,
    slot: impl FnOnce(&mut P) -> &mut PrivatePtr<T>,
    init: impl FnOnce(Private<P>) -> T,
) -> PublicBox<P>
where
    T: PrivateImpl,
{
    let owner = PublicBox::new(public);
    let instance = init(Private::from_ptr(owner.as_ptr()));

    // SAFETY: `owner` holds the only other pointer to the allocation and hands
    // out no references while this one is alive.
    let public: &mut P = unsafe { &mut *owner.as_ptr().as_ptr() };
    slot(public).set(instance);

    owner
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;

    struct Public {
        d: PrivatePtr<Instance>,
        value: Cell<i32>,
    }

    struct Instance {
        base: Private<Public>,
    }
    impl PrivateImpl for Instance {}

    #[test]
    fn test_back_ref_points_at_pinned_public() {
        let public = pin_public(
            Public {
                d: PrivatePtr::null(),
                value: Cell::new(4),
            },
            |public| &mut public.d,
            |base| Instance { base },
        );

        let expected = NonNull::from(&*public);
        assert_eq!(public.d.base.public_ptr(), expected);

        // SAFETY: `public` is alive, pinned and only borrowed shared.
        let back = unsafe { public.d.base.public() };
        back.value.set(back.value.get() * 2);
        assert_eq!(public.value.get(), 8);
    }

    #[test]
    fn test_owner_stays_usable_after_back_ref_access() {
        let public = pin_public(
            Public {
                d: PrivatePtr::null(),
                value: Cell::new(1),
            },
            |public| &mut public.d,
            |base| Instance { base },
        );

        for step in 1..=3 {
            // SAFETY: `public` is alive, never moves and is only borrowed shared.
            let back = unsafe { public.d.base.public() };
            back.value.set(back.value.get() + step);
            assert_eq!(public.value.get(), back.value.get());
            assert_eq!(public.as_pin().value.get(), back.value.get());
        }
        assert_eq!(public.value.get(), 7);
        drop(public);
    }

    #[test]
    fn test_panicking_init_drops_public() {
        extern crate std;

        struct Tracked {
            d: PrivatePtr<Instance>,
            dropped: Rc<Cell<bool>>,
        }

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.dropped.set(true);
            }
        }

        struct Instance {
            _base: Private<Tracked>,
        }
        impl PrivateImpl for Instance {}

        let dropped = Rc::new(Cell::new(false));
        let public = Tracked {
            d: PrivatePtr::null(),
            dropped: dropped.clone(),
        };
        let result = std::panic::catch_unwind(core::panic::AssertUnwindSafe(move || {
            pin_public(
                public,
                |public| &mut public.d,
                |_base| -> Instance { panic!("init failed") },
            )
        }));

        assert!(result.is_err());
        assert!(dropped.get());
    }

    #[test]
    fn test_public_box_send_sync_follow_value() {
        static_assertions::assert_impl_all!(PublicBox<u8>: Send, Sync);
        static_assertions::assert_not_impl_any!(PublicBox<Cell<u8>>: Sync);
        static_assertions::assert_not_impl_any!(PublicBox<u8>: Clone, Copy);
    }

    #[test]
    fn test_new_from_pinned_ref() {
        let value = 17_u64;
        let pinned = Pin::new(&value);
        let back = Private::new(pinned);
        assert_eq!(back.public_ptr(), NonNull::from(&value));
        // SAFETY: `value` is alive, does not move and is not mutably borrowed.
        assert_eq!(*unsafe { back.public() }, 17);
    }

    #[test]
    fn test_not_send_sync() {
        static_assertions::assert_not_impl_any!(Private<u8>: Send, Sync, Clone);
    }
}
