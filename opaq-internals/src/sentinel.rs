//! The verification marker stored at the head of every private instance.
//!
//! The field of [`Sentinel`] only exists in checked builds. Everything outside
//! this module goes through [`Sentinel::value`] and [`Sentinel::is_intact`],
//! which behave sensibly in both build modes.

/// The value written into every [`Sentinel`] in checked builds.
pub const MAGIC: u32 = 0xBEEF_DEAD;

/// Whether this build stores and verifies sentinels.
///
/// True when `debug_assertions` is on or the `checked` feature is enabled,
/// unless the crate is compiled with `--cfg opaq_unchecked`.
pub const CHECKED: bool = cfg!(all(
    any(debug_assertions, feature = "checked"),
    not(opaq_unchecked)
));

/// Marker proving that an allocation was created as a private instance.
///
/// A sentinel is initialized to [`MAGIC`] when the allocation is constructed
/// and is never written afterwards. Reading anything else means the pointer
/// does not lead to a live private instance.
///
/// In unchecked builds this type is zero-sized and always reports itself as
/// intact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sentinel {
    /// The stored marker, equal to [`MAGIC`] for a live instance.
    #[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
    value: u32,
}

impl Sentinel {
    /// Creates a sentinel holding [`MAGIC`].
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            #[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
            value: MAGIC,
        }
    }

    /// Creates a sentinel holding an arbitrary value, for corrupting
    /// allocations in tests.
    #[cfg(test)]
    pub(crate) const fn with_value(value: u32) -> Self {
        #[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
        {
            Self { value }
        }
        #[cfg(not(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked))))]
        {
            let _ = value;
            Self {}
        }
    }

    /// Returns the stored marker, or `None` in unchecked builds.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> Option<u32> {
        #[cfg(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked)))]
        {
            Some(self.value)
        }
        #[cfg(not(all(any(debug_assertions, feature = "checked"), not(opaq_unchecked))))]
        {
            None
        }
    }

    /// Returns `true` if the stored marker equals [`MAGIC`].
    ///
    /// Always `true` in unchecked builds.
    #[inline]
    #[must_use]
    pub const fn is_intact(&self) -> bool {
        match self.value() {
            Some(value) => value == MAGIC,
            None => true,
        }
    }
}

impl Default for Sentinel {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
