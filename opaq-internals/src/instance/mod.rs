//! Module containing the private instance allocation

mod data;
mod raw;
mod vtable;

pub use self::raw::{RawInstance, RawInstanceMut, RawInstanceRef};
