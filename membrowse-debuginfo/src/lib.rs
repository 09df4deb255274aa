//! ELF section/symbol scanning and DWARF analysis.
//!
//! This crate has no notion of memory regions or reports; it answers exactly two
//! questions about a compiled ELF: what allocated sections and symbols does it contain, and
//! for each symbol, what source file defined it. [`membrowse`] (the umbrella crate) joins
//! this with `membrowse-linker`'s region list to produce the final report.

pub mod arch;
pub mod dwarf;
pub mod error;
pub mod sections;
pub mod source;
pub mod symbols;

use goblin::elf::Elf;

pub use error::{DwarfError, DwarfErrorKind, ElfError};
pub use sections::{Section, SectionFlag, SectionKind};
pub use source::{SourceResolver, SourceSite};
pub use symbols::{Binding, Symbol, SymbolKind};

use membrowse_common::Arch;

/// The full result of scanning one ELF: its architecture, allocated sections, retained
/// symbols, and (if present) DWARF analysis.
pub struct DebugInfo<'a> {
    pub architecture: Arch,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub dwarf: Option<dwarf::DwarfAnalysis>,
    elf: Elf<'a>,
}

/// Everything that can stop [`DebugInfo::scan`] from producing a result: either the ELF
/// itself is unreadable, or cooperative cancellation fired mid-walk. Kept distinct from
/// [`ElfError`] so callers can tell "bad input" (exit code 3, §6.3) apart from "cancelled"
/// (exit code 130) instead of both collapsing into the same format error.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error("analysis was cancelled")]
    Cancelled,
}

impl<'a> DebugInfo<'a> {
    /// Parses `data` as an ELF and runs the section/symbol scanners plus (unless `data` has
    /// no `.debug_info`) the DWARF walk, honoring cooperative cancellation between stages.
    pub fn scan(data: &'a [u8], cancel: &dyn dwarf::CancelCheck) -> Result<Self, ScanError> {
        let elf = Elf::parse(data).map_err(ElfError::not_elf)?;
        if elf.header.e_ident[4] != 1 && elf.header.e_ident[4] != 2 {
            return Err(ElfError::unsupported_class().into());
        }

        let architecture = arch::detect(elf.header.e_machine);
        let sections = sections::scan_allocated_sections(&elf);
        let symbols = symbols::scan_symbols(&elf);

        let has_debug_info = elf
            .section_headers
            .iter()
            .any(|shdr| elf.shdr_strtab.get_at(shdr.sh_name) == Some(".debug_info"));

        let dwarf_analysis = if has_debug_info {
            let loaded = dwarf::load_dwarf(&elf, data);
            match dwarf::process(&loaded, cancel) {
                Ok(analysis) => Some(analysis),
                Err(dwarf::Cancelled) => return Err(ScanError::Cancelled),
            }
        } else {
            None
        };

        Ok(DebugInfo {
            architecture,
            sections,
            symbols,
            dwarf: dwarf_analysis,
            elf,
        })
    }

    pub fn elf(&self) -> &Elf<'a> {
        &self.elf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf_input() {
        let data = b"not an elf file";
        let err = DebugInfo::scan(data, &dwarf::NeverCancel);
        assert!(err.is_err());
    }
}
