//! Shared helpers for boxing error sources, in the style used throughout this codebase's
//! `thiserror`-based error types (see e.g. `ElfError`/`DwarfError` in `membrowse-debuginfo`).

use std::error::Error;

/// A type-erased, `Send + Sync` error source suitable for `#[source]` fields.
pub type BoxedSource = Box<dyn Error + Send + Sync + 'static>;

/// Boxes an arbitrary error payload into a [`BoxedSource`].
pub fn box_source<E>(source: E) -> BoxedSource
where
    E: Into<BoxedSource>,
{
    source.into()
}
