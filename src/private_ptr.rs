//! The owning pointer to a private implementation.

use core::{
    fmt,
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use opaq_internals::RawInstance;

use crate::capability::PrivateImpl;

/// FIXME: Once rust-lang/rust#132922 gets resolved, we can make the `raw` field
/// an unsafe field and remove this module.
mod limit_field_access {
    use core::marker::PhantomData;

    use opaq_internals::{RawInstance, RawInstanceMut, RawInstanceRef};

    use crate::capability::PrivateImpl;

    /// Sole owner of a heap-allocated private implementation.
    ///
    /// A [`PrivatePtr`] is either null or owns exactly one `T`. The value is
    /// destroyed when the pointer is dropped, reset or cleared, unless it was
    /// handed out with [`release`](PrivatePtr::release) first. In checked
    /// builds the value's sentinel is verified right before it is destroyed.
    ///
    /// The pointer cannot be cloned or copied:
    ///
    /// ```compile_fail
    /// use opaq::{PrivateImpl, PrivatePtr};
    ///
    /// struct Instance;
    /// impl PrivateImpl for Instance {}
    ///
    /// let first = PrivatePtr::new(Instance);
    /// let second = first.clone();
    /// ```
    ///
    /// ```compile_fail
    /// use opaq::{PrivateImpl, PrivatePtr};
    ///
    /// struct Instance;
    /// impl PrivateImpl for Instance {}
    ///
    /// let first = PrivatePtr::new(Instance);
    /// let second = first;
    /// assert!(first.is_null());
    /// ```
    pub struct PrivatePtr<T: PrivateImpl> {
        /// # Safety
        ///
        /// The following safety invariants are guaranteed to be upheld as long
        /// as this struct exists:
        ///
        /// 1. If `raw` is `Some`, the value embedded in the [`RawInstance`]
        ///    is of type `T`.
        raw: Option<RawInstance>,
        _instance: PhantomData<T>,
    }

    impl<T: PrivateImpl> PrivatePtr<T> {
        /// Creates a pointer that owns nothing.
        #[inline]
        #[must_use]
        pub const fn null() -> Self {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Vacuous, `raw` is `None`
            PrivatePtr {
                raw: None,
                _instance: PhantomData,
            }
        }

        /// Creates a pointer from a raw instance.
        ///
        /// # Safety
        ///
        /// The caller must ensure:
        ///
        /// 1. If `raw` is `Some`, the value embedded in the [`RawInstance`] is
        ///    of type `T`.
        #[inline]
        #[must_use]
        pub(crate) unsafe fn from_raw_instance(raw: Option<RawInstance>) -> Self {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Guaranteed by the caller
            PrivatePtr {
                raw,
                _instance: PhantomData,
            }
        }

        /// Stores a freshly allocated `value`, returning the previous raw
        /// instance without destroying it.
        #[inline]
        pub(crate) fn replace_raw(&mut self, value: Option<T>) -> Option<RawInstance> {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. The new raw instance, if any, was just allocated around a `T`
            let new = value.map(RawInstance::new);
            core::mem::replace(&mut self.raw, new)
        }

        /// Takes the raw instance out, leaving the pointer null.
        #[inline]
        pub(crate) fn take_raw(&mut self) -> Option<RawInstance> {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Vacuous, `raw` becomes `None`
            self.raw.take()
        }

        /// Exchanges the raw instances of two pointers.
        #[inline]
        pub(crate) fn swap_raw(&mut self, other: &mut Self) {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Both raw instances hold a `T`, so either of them may be stored in
            //    either pointer
            core::mem::swap(&mut self.raw, &mut other.raw);
        }

        /// Creates a lifetime-bound [`RawInstanceRef`] from the inner
        /// [`RawInstance`].
        #[inline]
        pub(crate) fn as_raw_ref(&self) -> Option<RawInstanceRef<'_>> {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. No mutation is possible through the `RawInstanceRef`
            self.raw.as_ref().map(RawInstance::as_ref)
        }

        /// Creates a lifetime-bound [`RawInstanceMut`] from the inner
        /// [`RawInstance`].
        #[inline]
        pub(crate) fn as_raw_mut(&mut self) -> Option<RawInstanceMut<'_>> {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. The `RawInstanceMut` only gives access to the value, not to the
            //    `raw` field itself, so the stored type cannot change
            self.raw.as_mut().map(RawInstance::as_mut)
        }
    }
}
pub use limit_field_access::PrivatePtr;

impl<T: PrivateImpl> PrivatePtr<T> {
    /// Allocates `value` on the heap and takes ownership of it.
    ///
    /// No verification happens here; the sentinel is checked when the value
    /// is destroyed.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaq::{PrivateImpl, PrivatePtr};
    ///
    /// struct Instance {
    ///     hits: u32,
    /// }
    /// impl PrivateImpl for Instance {}
    ///
    /// let ptr = PrivatePtr::new(Instance { hits: 3 });
    /// assert!(!ptr.is_null());
    /// assert_eq!(ptr.hits, 3);
    /// ```
    #[inline]
    #[must_use]
    pub fn new(value: T) -> Self {
        let mut this = Self::null();
        let previous = this.replace_raw(Some(value));
        debug_assert!(previous.is_none());
        this
    }

    /// Destroys the owned value, if any, and takes ownership of `value`
    /// instead.
    ///
    /// The old value is verified and destroyed before the new one is stored.
    /// While the old value's destructor runs, the pointer is null. Passing
    /// `None` leaves the pointer null.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the sentinel of the owned value is not
    /// intact. The broken allocation is leaked rather than freed and the
    /// pointer is left null.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaq::{PrivateImpl, PrivatePtr};
    ///
    /// struct Instance(&'static str);
    /// impl PrivateImpl for Instance {}
    ///
    /// let mut ptr = PrivatePtr::new(Instance("old"));
    /// ptr.reset(Some(Instance("new")));
    /// assert_eq!(ptr.0, "new");
    ///
    /// ptr.reset(None);
    /// assert!(ptr.is_null());
    /// ```
    #[track_caller]
    #[inline]
    pub fn reset(&mut self, value: Option<T>) {
        if let Some(old) = self.take_raw() {
            old.destroy();
        }
        let previous = self.replace_raw(value);
        debug_assert!(previous.is_none());
    }

    /// Destroys the owned value, if any, and takes ownership of `value`.
    ///
    /// Shorthand for `reset(Some(value))`.
    #[track_caller]
    #[inline]
    pub fn set(&mut self, value: T) {
        self.reset(Some(value));
    }

    /// Destroys the owned value, if any, leaving the pointer null.
    ///
    /// Shorthand for `reset(None)`. This is also what happens when the
    /// pointer is dropped.
    #[track_caller]
    #[inline]
    pub fn clear(&mut self) {
        self.reset(None);
    }

    /// Returns a shared reference to the owned value, or `None` if the
    /// pointer is null.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        let raw = self.as_raw_ref()?;
        // SAFETY: The raw instance holds a `T` by the invariants of `PrivatePtr`.
        Some(unsafe { raw.value_downcast_unchecked::<T>() })
    }

    /// Returns a mutable reference to the owned value, or `None` if the
    /// pointer is null.
    #[inline]
    #[must_use]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let raw = self.as_raw_mut()?;
        // SAFETY: The raw instance holds a `T` by the invariants of `PrivatePtr`.
        Some(unsafe { raw.value_downcast_unchecked::<T>() })
    }

    /// Returns the address of the owned value, or a null pointer.
    ///
    /// Ownership stays with this [`PrivatePtr`].
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        match self.get() {
            Some(value) => core::ptr::from_ref(value),
            None => core::ptr::null(),
        }
    }

    /// Gives up ownership of the value without destroying it.
    ///
    /// The pointer becomes null. The caller is now responsible for the value
    /// and must hand the returned pointer to [`PrivatePtr::from_raw`] for it
    /// to ever be destroyed. No verification happens here.
    ///
    /// # Examples
    ///
    /// ```
    /// use opaq::{PrivateImpl, PrivatePtr};
    ///
    /// struct Instance(u8);
    /// impl PrivateImpl for Instance {}
    ///
    /// let mut ptr = PrivatePtr::new(Instance(5));
    /// let address = ptr.as_ptr();
    ///
    /// let released = ptr.release().unwrap();
    /// assert!(ptr.is_null());
    /// assert_eq!(released.as_ptr().cast_const(), address);
    ///
    /// // SAFETY: `released` came from `release` and is adopted only once.
    /// let adopted = unsafe { PrivatePtr::from_raw(released) };
    /// assert_eq!(adopted.0, 5);
    /// ```
    #[inline]
    #[must_use = "the released value is leaked unless it is passed to `PrivatePtr::from_raw`"]
    pub fn release(&mut self) -> Option<NonNull<T>> {
        let raw = self.take_raw()?;
        // SAFETY: The raw instance holds a `T` by the invariants of `PrivatePtr`.
        let ptr = unsafe { raw.into_value_ptr::<T>() };
        tracing::trace!(
            type_name = core::any::type_name::<T>(),
            address = ?ptr,
            "released private instance"
        );
        Some(ptr)
    }

    /// Takes ownership of a value previously given up with
    /// [`PrivatePtr::release`].
    ///
    /// The sentinel is not checked here. In checked builds, a pointer that
    /// did not come from [`PrivatePtr::release`] is detected when the
    /// returned [`PrivatePtr`] destroys it.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`PrivatePtr::release`] on a
    ///    `PrivatePtr<T>` with the same `T`.
    /// 2. `ptr` has not been passed to [`PrivatePtr::from_raw`] since it was
    ///    released.
    #[inline]
    #[must_use]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        tracing::trace!(
            type_name = core::any::type_name::<T>(),
            address = ?ptr,
            "adopted private instance"
        );
        // SAFETY: `ptr` came from `RawInstance::into_value_ptr::<T>` in `release`
        // and is adopted only once, as guaranteed by our caller.
        let raw = unsafe { RawInstance::from_value_ptr(ptr) };
        // SAFETY: The raw instance holds a `T`, as guaranteed by our caller.
        unsafe { Self::from_raw_instance(Some(raw)) }
    }

    /// Moves the value out, leaving the pointer null.
    ///
    /// Unlike [`release`](PrivatePtr::release) this frees the allocation, so
    /// the sentinel is verified first.
    ///
    /// # Panics
    ///
    /// In checked builds, panics if the sentinel of the owned value is not
    /// intact.
    #[track_caller]
    #[inline]
    pub fn take(&mut self) -> Option<T> {
        let raw = self.take_raw()?;
        // SAFETY: The raw instance holds a `T` by the invariants of `PrivatePtr`.
        Some(unsafe { raw.into_value_unchecked::<T>() })
    }

    /// Exchanges the owned values of two pointers.
    ///
    /// Nothing is constructed or destroyed, so this is a cheap way to
    /// replace a value only once its replacement is fully built.
    #[inline]
    pub fn swap(&mut self, other: &mut Self) {
        self.swap_raw(other);
    }

    /// Returns `true` if the pointer owns nothing.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.as_raw_ref().is_none()
    }
}

#[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
impl<T: PrivateImpl> PrivatePtr<T> {
    /// Returns `true` if the pointer owns a value whose sentinel is intact.
    ///
    /// Meant for assertions at call sites, not for control flow. Only
    /// available in checked builds.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.as_raw_ref().is_some_and(|raw| raw.is_intact())
    }

    /// Returns the sentinel stored in front of the owned value, or `None` if
    /// the pointer is null.
    ///
    /// Only available in checked builds.
    #[inline]
    #[must_use]
    pub fn sentinel(&self) -> Option<u32> {
        self.as_raw_ref().and_then(|raw| raw.sentinel().value())
    }
}

impl<T: PrivateImpl> Deref for PrivatePtr<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the pointer is null.
    #[track_caller]
    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => null_dereference::<T>(),
        }
    }
}

impl<T: PrivateImpl> DerefMut for PrivatePtr<T> {
    /// # Panics
    ///
    /// Panics if the pointer is null.
    #[track_caller]
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => null_dereference::<T>(),
        }
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn null_dereference<T>() -> ! {
    panic!(
        "dereferenced a null PrivatePtr<{}>",
        core::any::type_name::<T>()
    )
}

impl<T: PrivateImpl> Default for PrivatePtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: PrivateImpl> From<T> for PrivatePtr<T> {
    #[inline]
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: PrivateImpl> fmt::Debug for PrivatePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PrivatePtr");
        s.field("type", &core::any::type_name::<T>());
        match self.as_raw_ref() {
            Some(raw) => s.field("address", &self.as_ptr()).field("intact", &raw.is_intact()),
            None => s.field("address", &"null"),
        };
        s.finish()
    }
}

impl<T: PrivateImpl> fmt::Pointer for PrivatePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

// SAFETY: A `PrivatePtr<T>` owns its `T` exactly like a `Box<T>`, so it can be
// sent to another thread whenever `T` can.
unsafe impl<T: PrivateImpl + Send> Send for PrivatePtr<T> {}

// SAFETY: Shared access to a `PrivatePtr<T>` only hands out `&T`, so sharing it
// between threads is fine whenever sharing `T` is.
unsafe impl<T: PrivateImpl + Sync> Sync for PrivatePtr<T> {}
