//! Commonly used items for convenient importing.
//!
//! ```rust
//! use opaq::prelude::*;
//!
//! struct Instance {
//!     id: u32,
//! }
//! impl PrivateImpl for Instance {}
//!
//! let ptr: PrivatePtr<Instance> = PrivatePtr::new(Instance { id: 1 });
//! assert_eq!(ptr.id, 1);
//! ```

pub use crate::{Private, PrivateImpl, PrivatePtr, PublicBox, pin_public};
