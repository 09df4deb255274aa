//! Error types for ELF and DWARF processing.

use membrowse_common::BoxedSource;

#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct ElfError {
    kind: ElfErrorKind,
    #[source]
    source: Option<BoxedSource>,
}

#[derive(Debug, thiserror::Error)]
enum ElfErrorKind {
    #[error("not a valid ELF file")]
    NotElf,
    #[error("unsupported ELF class (expected 32- or 64-bit)")]
    UnsupportedClass,
    #[error("truncated or corrupt ELF file")]
    Truncated,
}

impl ElfError {
    pub fn not_elf(source: impl Into<BoxedSource>) -> Self {
        ElfError {
            kind: ElfErrorKind::NotElf,
            source: Some(source.into()),
        }
    }

    pub fn unsupported_class() -> Self {
        ElfError {
            kind: ElfErrorKind::UnsupportedClass,
            source: None,
        }
    }

    pub fn truncated(source: impl Into<BoxedSource>) -> Self {
        ElfError {
            kind: ElfErrorKind::Truncated,
            source: Some(source.into()),
        }
    }
}

/// A DWARF processing failure scoped to a single compilation unit. Per the error taxonomy's
/// "the DWARF layer is lenient" philosophy, callers log these and skip the offending CU
/// rather than aborting the whole analysis.
#[derive(Debug, thiserror::Error)]
#[error("compilation unit at offset {unit_offset:#x}: {kind}")]
pub struct DwarfError {
    pub unit_offset: usize,
    pub kind: DwarfErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DwarfErrorKind {
    #[error("malformed abbreviation table: {0}")]
    Abbrev(String),
    #[error("malformed DIE tree: {0}")]
    DieTree(String),
    #[error("malformed line program: {0}")]
    LineProgram(String),
    #[error("unsupported DWARF version {0}")]
    UnsupportedVersion(u16),
}
