#![cfg_attr(not(doc), no_std)]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Extra checks on nightly
#![cfg_attr(nightly_extra_checks, feature(rustdoc_missing_doc_code_examples))]
#![cfg_attr(nightly_extra_checks, forbid(rustdoc::missing_doc_code_examples))]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Verified single-owner pointers for opaque private implementations.
//!
//! ## Overview
//!
//! This crate supports the "private implementation" pattern: a public type
//! keeps all of its state in a separate, hidden type and holds nothing but a
//! pointer to it. The public type's layout never changes when the hidden type
//! does, and none of the hidden type's fields or helpers leak into the public
//! interface.
//!
//! Three pieces make up the pattern:
//!
//! - **[`PrivateImpl`]**: marker trait implemented by every hidden type.
//! - **[`PrivatePtr`]**: the sole owner of the hidden instance. It destroys the
//!   instance exactly once, on drop or on [`reset`](PrivatePtr::reset), and in
//!   checked builds verifies the instance before destroying it.
//! - **[`Private`]**: a non-owning back-reference the hidden instance can embed
//!   to call back into its public type. [`pin_public`] places the public value
//!   at a fixed address first and returns a [`PublicBox`] that keeps it there.
//!
//! ## Quick Example
//!
//! ```
//! use opaq::prelude::*;
//!
//! pub struct Parser {
//!     d: PrivatePtr<Instance>,
//! }
//!
//! struct Instance {
//!     depth: usize,
//!     tokens: Vec<String>,
//! }
//!
//! impl PrivateImpl for Instance {}
//!
//! impl Parser {
//!     pub fn new() -> Self {
//!         Self {
//!             d: PrivatePtr::new(Instance {
//!                 depth: 0,
//!                 tokens: Vec::new(),
//!             }),
//!         }
//!     }
//!
//!     pub fn feed(&mut self, token: &str) {
//!         if token == "(" {
//!             self.d.depth += 1;
//!         }
//!         self.d.tokens.push(token.to_owned());
//!     }
//!
//!     pub fn depth(&self) -> usize {
//!         self.d.depth
//!     }
//! }
//!
//! let mut parser = Parser::new();
//! parser.feed("(");
//! parser.feed("x");
//! assert_eq!(parser.depth(), 1);
//! ```
//!
//! ## Checked builds
//!
//! Every private instance is allocated behind a small header. In checked
//! builds the header holds a sentinel set to [`MAGIC`] when the instance is
//! constructed. Destroying an instance, whether through
//! [`reset`](PrivatePtr::reset), [`clear`](PrivatePtr::clear),
//! [`take`](PrivatePtr::take) or dropping the pointer, first checks that
//! sentinel and panics on a mismatch instead of freeing memory that does not
//! belong to a private instance. Construction itself performs no check.
//!
//! Checked builds are selected at compile time:
//!
//! - they are on whenever `debug_assertions` is on,
//! - the `checked` feature turns them on in release builds too,
//! - compiling with `RUSTFLAGS="--cfg opaq_unchecked"` turns them off
//!   everywhere.
//!
//! [`CHECKED`] reports the mode that is in effect. In unchecked builds the
//! sentinel takes no space, verification compiles to nothing, and
//! [`PrivatePtr::is_valid`] and [`PrivatePtr::sentinel`] do not exist.
//!
//! ## Logging
//!
//! Ownership transfers through [`PrivatePtr::release`] and
//! [`PrivatePtr::from_raw`] emit `TRACE` events, and a failed verification
//! emits an `ERROR` event right before the panic, all through [`tracing`].
//!
//! ## Threading
//!
//! [`PrivatePtr`] has no internal synchronization. Like [`Box`], it is
//! [`Send`] or [`Sync`] exactly when the owned type is, and so is
//! [`PublicBox`]. [`Private`] wraps a raw pointer and is neither.
//!
//! [`Box`]: alloc::boxed::Box
//! [`tracing`]: https://docs.rs/tracing

extern crate alloc;

mod back_ref;
pub mod capability;
pub mod prelude;
mod private_ptr;

pub use self::{
    back_ref::{Private, PublicBox, pin_public},
    capability::{CHECKED, MAGIC, PrivateImpl},
    private_ptr::PrivatePtr,
};
