#![no_std]
#![forbid(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`opaq`].
//!
//! # Overview
//!
//! This crate contains the type-erased heap allocation and the unsafe
//! operations behind [`opaq::PrivatePtr`]. Every private instance lives in a
//! single allocation whose header carries a verification [`Sentinel`] and a
//! vtable, followed by the instance itself.
//!
//! **This crate is an implementation detail.** No semantic versioning
//! guarantees are provided. Users should depend on the [`opaq`] crate, not
//! this one.
//!
//! # Architecture
//!
//! - **[`instance`]**: Type-erased private instance storage
//!   - [`RawInstance`]: Owned instance with [`Box`]-based allocation
//!   - [`RawInstanceRef`]/[`RawInstanceMut`]: Borrowed references (shared/mutable)
//!   - [`InstanceData`]: `#[repr(C)]` header + value, enabling field access on
//!     erased types
//!   - [`InstanceVtable`]: Function pointers for destruction and type
//!     information
//!
//! - **[`sentinel`]**: The verification marker
//!   - [`Sentinel`]: Holds [`MAGIC`] in checked builds, zero-sized otherwise
//!   - [`CHECKED`]: Whether this build stores and verifies sentinels
//!
//! # Safety Strategy
//!
//! When an `InstanceData<T>` is erased to `InstanceData<Erased>`, the only
//! fields that may be touched without knowing `T` are the ones in front of the
//! value. The sentinel is the very first field, so it can always be read
//! through an erased pointer, even when the pointer is not actually ours.
//! Only after the sentinel checks out is the vtable trusted to destroy the
//! allocation.
//!
//! Safety-critical fields stay module-private, so the invariants of each type
//! can be verified by reading a single file.
//!
//! # Build modes
//!
//! Sentinels are stored and verified when `debug_assertions` is on or the
//! `checked` feature is enabled. Building with `--cfg opaq_unchecked` turns
//! them off everywhere, in which case [`Sentinel`] is zero-sized and
//! verification compiles to nothing.
//!
//! [`opaq`]: https://docs.rs/opaq/latest/opaq/
//! [`opaq::PrivatePtr`]: https://docs.rs/opaq/latest/opaq/struct.PrivatePtr.html
//! [`InstanceData`]: instance::data::InstanceData
//! [`InstanceVtable`]: instance::vtable::InstanceVtable
//! [`Box`]: alloc::boxed::Box

extern crate alloc;

mod instance;
mod sentinel;
mod util;

pub use instance::{RawInstance, RawInstanceMut, RawInstanceRef};
pub use sentinel::{CHECKED, MAGIC, Sentinel};
