//! The capability every private implementation type carries.
//!
//! A type becomes eligible for [`PrivatePtr`](crate::PrivatePtr) by
//! implementing [`PrivateImpl`]. The trait has no methods: what it buys is the
//! allocation layout that [`PrivatePtr`](crate::PrivatePtr) gives every
//! instance, with a verification sentinel in front of the value and a vtable
//! that knows how to destroy it.
//!
//! # Checked builds
//!
//! In checked builds (see [`CHECKED`]) the sentinel holds [`MAGIC`] from the
//! moment the instance is constructed. Before an instance is destroyed its
//! sentinel is compared against [`MAGIC`], and a mismatch aborts the
//! operation with a panic. This catches pointers that never came from a
//! [`PrivatePtr`](crate::PrivatePtr), or that were already destroyed, when
//! they are handed back through
//! [`PrivatePtr::from_raw`](crate::PrivatePtr::from_raw).
//!
//! In unchecked builds the sentinel takes no space and verification compiles
//! to nothing.

pub use opaq_internals::{CHECKED, MAGIC};

/// Marker trait for types used as the private implementation of a public
/// type.
///
/// Implement it for the hidden `Instance` type of every public type that owns
/// a [`PrivatePtr`](crate::PrivatePtr). Types that need to call back into
/// their public type embed a [`Private`](crate::Private) as well.
///
/// # Examples
///
/// ```
/// use opaq::{PrivateImpl, PrivatePtr};
///
/// pub struct Config {
///     d: PrivatePtr<Instance>,
/// }
///
/// struct Instance {
///     entries: Vec<(String, String)>,
/// }
///
/// impl PrivateImpl for Instance {}
///
/// impl Config {
///     pub fn new() -> Self {
///         Self {
///             d: PrivatePtr::new(Instance {
///                 entries: Vec::new(),
///             }),
///         }
///     }
///
///     pub fn insert(&mut self, key: &str, value: &str) {
///         self.d.entries.push((key.to_owned(), value.to_owned()));
///     }
///
///     pub fn len(&self) -> usize {
///         self.d.entries.len()
///     }
/// }
///
/// let mut config = Config::new();
/// config.insert("mode", "fast");
/// assert_eq!(config.len(), 1);
/// ```
pub trait PrivateImpl: 'static {}
