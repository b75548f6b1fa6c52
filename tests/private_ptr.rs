//! Lifecycle tests for `PrivatePtr`: construction, reset, release, swap and
//! verification.

use std::{cell::RefCell, rc::Rc};

use opaq::{CHECKED, MAGIC, PrivateImpl, PrivatePtr};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Shared log of the ids of destroyed instances, in destruction order.
#[derive(Clone, Default)]
struct Destructions(Rc<RefCell<Vec<u32>>>);

impl Destructions {
    fn count(&self) -> usize {
        self.0.borrow().len()
    }

    fn ids(&self) -> Vec<u32> {
        self.0.borrow().clone()
    }
}

struct Instance {
    id: u32,
    destructions: Destructions,
}

impl Instance {
    fn new(id: u32, destructions: &Destructions) -> Self {
        Self {
            id,
            destructions: destructions.clone(),
        }
    }
}

impl PrivateImpl for Instance {}

impl Drop for Instance {
    fn drop(&mut self) {
        self.destructions.0.borrow_mut().push(self.id);
    }
}

#[test]
fn test_null_after_default_reset_and_release() {
    let destructions = Destructions::default();

    let ptr = PrivatePtr::<Instance>::default();
    assert!(ptr.is_null());

    let mut ptr = PrivatePtr::new(Instance::new(1, &destructions));
    assert!(!ptr.is_null());
    ptr.reset(None);
    assert!(ptr.is_null());

    let mut ptr = PrivatePtr::new(Instance::new(2, &destructions));
    let released = ptr.release().unwrap();
    assert!(ptr.is_null());

    // SAFETY: `released` came from `release` and is adopted only once.
    drop(unsafe { PrivatePtr::from_raw(released) });
    assert_eq!(destructions.ids(), [1, 2]);
}

#[test]
fn test_exactly_one_destruction_per_instance() {
    let destructions = Destructions::default();

    {
        let _scoped = PrivatePtr::new(Instance::new(1, &destructions));
    }
    assert_eq!(destructions.ids(), [1]);

    let mut reset = PrivatePtr::new(Instance::new(2, &destructions));
    reset.clear();
    reset.clear();
    drop(reset);
    assert_eq!(destructions.ids(), [1, 2]);

    let explicit = PrivatePtr::new(Instance::new(3, &destructions));
    drop(explicit);
    assert_eq!(destructions.ids(), [1, 2, 3]);
}

#[test]
fn test_reset_destroys_old_and_holds_new() {
    let destructions = Destructions::default();
    let mut ptr = PrivatePtr::new(Instance::new(10, &destructions));

    ptr.reset(Some(Instance::new(11, &destructions)));
    assert_eq!(destructions.ids(), [10]);
    assert_eq!(ptr.get().map(|instance| instance.id), Some(11));

    ptr.set(Instance::new(12, &destructions));
    assert_eq!(destructions.ids(), [10, 11]);
    assert_eq!(ptr.id, 12);

    drop(ptr);
    assert_eq!(destructions.ids(), [10, 11, 12]);
}

#[test]
fn test_release_does_not_destroy() {
    init_tracing();
    let destructions = Destructions::default();

    let mut ptr = PrivatePtr::new(Instance::new(7, &destructions));
    let original = ptr.as_ptr();

    let released = ptr.release().unwrap();
    assert!(ptr.is_null());
    assert_eq!(released.as_ptr().cast_const(), original);

    drop(ptr);
    assert_eq!(destructions.count(), 0);

    // SAFETY: `released` points to the live instance we just released.
    assert_eq!(unsafe { released.as_ref() }.id, 7);

    // SAFETY: `released` came from `release` and is adopted only once.
    let adopted = unsafe { PrivatePtr::from_raw(released) };
    assert_eq!(adopted.as_ptr(), original);
    drop(adopted);
    assert_eq!(destructions.ids(), [7]);
}

#[test]
fn test_swap_is_an_involution() {
    let destructions = Destructions::default();
    let mut a = PrivatePtr::new(Instance::new(1, &destructions));
    let mut b = PrivatePtr::<Instance>::null();

    let a_before = a.as_ptr();
    let b_before = b.as_ptr();

    a.swap(&mut b);
    assert!(a.is_null());
    assert_eq!(b.as_ptr(), a_before);
    assert_eq!(b.id, 1);

    a.swap(&mut b);
    assert_eq!(a.as_ptr(), a_before);
    assert_eq!(b.as_ptr(), b_before);
    assert_eq!(destructions.count(), 0);
}

#[test]
fn test_swap_exchanges_two_instances() {
    let destructions = Destructions::default();
    let mut a = PrivatePtr::new(Instance::new(1, &destructions));
    let mut b = PrivatePtr::new(Instance::new(2, &destructions));

    a.swap(&mut b);
    assert_eq!((a.id, b.id), (2, 1));

    drop(a);
    assert_eq!(destructions.ids(), [2]);
    drop(b);
    assert_eq!(destructions.ids(), [2, 1]);
}

#[test]
fn test_get_mut_and_deref_mut() {
    let destructions = Destructions::default();
    let mut ptr = PrivatePtr::new(Instance::new(1, &destructions));

    ptr.get_mut().unwrap().id = 2;
    assert_eq!(ptr.id, 2);
    ptr.id += 1;
    assert_eq!(ptr.get().unwrap().id, 3);
}

#[test]
fn test_take_frees_without_destroying_value() {
    let destructions = Destructions::default();
    let mut ptr = PrivatePtr::from(Instance::new(5, &destructions));

    let instance = ptr.take().unwrap();
    assert!(ptr.is_null());
    assert_eq!(destructions.count(), 0);
    assert_eq!(instance.id, 5);

    drop(instance);
    assert_eq!(destructions.ids(), [5]);
}

#[test]
fn test_sentinel_matches_build_mode() {
    let destructions = Destructions::default();
    let ptr = PrivatePtr::new(Instance::new(1, &destructions));

    assert_eq!(MAGIC, 0xBEEF_DEAD);
    assert_eq!(
        CHECKED,
        cfg!(all(
            any(debug_assertions, feature = "checked"),
            not(opaq_unchecked)
        ))
    );

    #[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
    {
        assert!(ptr.is_valid());
        assert_eq!(ptr.sentinel(), Some(MAGIC));
        assert!(!PrivatePtr::<Instance>::null().is_valid());
        assert_eq!(PrivatePtr::<Instance>::null().sentinel(), None);
    }

    drop(ptr);
}

#[test]
#[should_panic(expected = "dereferenced a null PrivatePtr")]
fn test_deref_of_null_panics() {
    let ptr = PrivatePtr::<Instance>::null();
    let _id = ptr.id;
}

/// Mirrors the header a `PrivatePtr` puts in front of its value in checked
/// builds, with a sentinel that was never set.
#[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
#[allow(dead_code)]
#[repr(C)]
struct Forged {
    sentinel: u32,
    vtable: *const (),
    value: Instance,
}

#[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
#[test]
fn test_foreign_pointer_is_caught_before_destruction() {
    init_tracing();
    let destructions = Destructions::default();
    let mut forged = Forged {
        sentinel: 0x0BAD_F00D,
        vtable: std::ptr::null(),
        value: Instance::new(99, &destructions),
    };

    // SAFETY: `value` lies inside `forged`, so the offset stays in bounds. The
    // pointer is derived from the whole struct and may read the sentinel in
    // front of the value.
    let foreign = unsafe {
        std::ptr::NonNull::from(&mut forged)
            .byte_add(std::mem::offset_of!(Forged, value))
            .cast::<Instance>()
    };
    // SAFETY: Deliberately not upheld: `foreign` never came from `release`.
    // Only the sentinel in front of it is ever read, and that lies inside
    // `forged`.
    let mut ptr = unsafe { PrivatePtr::from_raw(foreign) };
    assert!(!ptr.is_valid());
    assert_eq!(ptr.sentinel(), Some(0x0BAD_F00D));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ptr.reset(None)));
    let message = result.unwrap_err();
    let message = message
        .downcast_ref::<String>()
        .map(String::as_str)
        .unwrap_or_default();
    assert!(message.contains("failed sentinel verification"), "{message}");

    assert!(ptr.is_null());
    assert_eq!(destructions.count(), 0);
    assert_eq!(forged.value.id, 99);
}
