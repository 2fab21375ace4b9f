//! fOS Native Plugin ABI
//!
//! Bit-exact definitions of the structures, result codes and function
//! tables exchanged with native plugin modules.
//!
//! Nothing in this crate is safe to use on its own: every pointer here
//! crosses into foreign code. The host side lives in `fos-plugins`.
//!
//! # Layout
//! - [`types`] - instance handle, streams, windows, rectangles, codes
//! - [`funcs`] - host-supplied and plugin-supplied function tables
//! - [`event`] - the tagged event union handed to windowless plugins
//! - [`runtime`] - scripting bridge objects, variants and identifiers

#![allow(non_camel_case_types)]

pub mod event;
pub mod funcs;
pub mod runtime;
pub mod types;

pub use event::*;
pub use funcs::*;
pub use runtime::*;
pub use types::*;
