//! Shared primitives for the membrowse analysis core.
//!
//! This crate has no knowledge of ELF, DWARF, or linker scripts; it only hosts the
//! small set of types and helpers that `membrowse-linker`, `membrowse-debuginfo`, and
//! `membrowse` all need: architecture classification, a memory-mapped byte view, and a
//! handful of numeric formatting helpers for the wire format.

mod arch;
mod byteview;
mod error;
mod units;

pub use arch::Arch;
pub use byteview::ByteView;
pub use error::{box_source, BoxedSource};
pub use units::{hex_u64, parse_linker_integer, utilization_percent};
