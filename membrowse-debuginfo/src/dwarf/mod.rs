//! Walks DWARF `.debug_info`/`.debug_line` to map every symbol the scanner found back to
//! its source file of *definition*.

mod resolve;
mod walk;

use std::collections::BTreeMap;

use gimli::{EndianSlice, RunTimeEndian};

use crate::error::{DwarfError, DwarfErrorKind};

pub use resolve::{resolve_definitions, Candidate, CandidateKind, DefinitionSite};

pub type Reader<'a> = EndianSlice<'a, RunTimeEndian>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Language {
    C,
    Cpp,
    Rust,
    Other,
}

impl Language {
    fn from_dw_lang(lang: gimli::DwLang) -> Language {
        match lang {
            gimli::DW_LANG_C | gimli::DW_LANG_C89 | gimli::DW_LANG_C99 | gimli::DW_LANG_C11 => Language::C,
            gimli::DW_LANG_C_plus_plus
            | gimli::DW_LANG_C_plus_plus_03
            | gimli::DW_LANG_C_plus_plus_11
            | gimli::DW_LANG_C_plus_plus_14 => Language::Cpp,
            gimli::DW_LANG_Rust => Language::Rust,
            _ => Language::Other,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Rust => "rust",
            Language::Other => "other",
        }
    }
}

/// One entry in a CU's file table, keeping both the form DWARF actually stored (possibly a
/// relative path plus a separate directory index) and a normalized form used only for
/// deduplication, never for display (§4.3).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    pub original: String,
    normalized: String,
}

impl FileEntry {
    pub fn new(original: String) -> Self {
        let normalized = normalize(&original);
        FileEntry { original, normalized }
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
}

#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub name: String,
    pub comp_dir: String,
    pub producer: String,
    pub language: Language,
    pub low_pc: Option<u64>,
    pub high_pc: Option<u64>,
    pub file_table: Vec<FileEntry>,
    pub unit_offset: usize,
}

impl CompilationUnit {
    pub fn contains(&self, address: u64) -> bool {
        match (self.low_pc, self.high_pc) {
            (Some(lo), Some(hi)) => address >= lo && address < hi,
            _ => false,
        }
    }

    pub fn file_at(&self, index: u64) -> Option<&str> {
        self.file_table.get(index as usize).map(|f| f.original.as_str())
    }
}

/// The result of walking all compilation units: per-CU metadata plus the merged
/// `(address, name) -> definition site` map used by [`crate::source::SourceResolver`].
pub struct DwarfAnalysis {
    pub units: Vec<CompilationUnit>,
    pub definitions: BTreeMap<(u64, String), DefinitionSite>,
    pub line_rows: Vec<LineRow>,
}

/// One row of a CU's line number program, flattened for address lookup.
#[derive(Clone, Copy, Debug)]
pub struct LineRow {
    pub address: u64,
    pub cu_index: usize,
    pub file_index: u64,
    pub line: Option<u32>,
}

/// Loads the standard `.debug_*` sections from an ELF's section table via `goblin`, handing
/// back a `gimli::Dwarf` ready for unit iteration. Missing sections are treated as empty,
/// matching `gimli`'s own convention and letting callers walk ELFs with partial debug info.
pub fn load_dwarf<'a>(elf: &goblin::elf::Elf<'a>, data: &'a [u8]) -> gimli::Dwarf<Reader<'a>> {
    let endian = if elf.little_endian {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let load_section = |id: gimli::SectionId| -> Result<Reader<'a>, gimli::Error> {
        let name = id.name();
        let section_data = elf
            .section_headers
            .iter()
            .find(|shdr| elf.shdr_strtab.get_at(shdr.sh_name) == Some(name))
            .and_then(|shdr| {
                let start = shdr.sh_offset as usize;
                let end = start + shdr.sh_size as usize;
                data.get(start..end)
            })
            .unwrap_or(&[]);
        Ok(EndianSlice::new(section_data, endian))
    };

    gimli::Dwarf::load(load_section).expect("load_section never returns Err")
}

/// Cooperative cancellation, checked between compilation units per §5's resource model.
pub trait CancelCheck {
    fn is_cancelled(&self) -> bool;
}

pub struct NeverCancel;

impl CancelCheck for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
#[error("analysis was cancelled")]
pub struct Cancelled;

/// Walks every compilation unit in `dwarf`, collecting file tables and definition-site
/// candidates, then merges candidates into a single deterministic `definitions` map.
///
/// CUs that fail to parse raise a [`DwarfError`] which is logged by the caller and skipped;
/// this function never aborts the whole walk because of one malformed unit ("the DWARF
/// layer is lenient", §7).
pub fn process<'a>(
    dwarf: &gimli::Dwarf<Reader<'a>>,
    cancel: &dyn CancelCheck,
) -> Result<DwarfAnalysis, Cancelled> {
    let mut units = Vec::new();
    let mut all_candidates: Vec<Candidate> = Vec::new();
    let mut all_line_rows: Vec<LineRow> = Vec::new();

    let mut iter = dwarf.units();
    let mut unit_index = 0usize;
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let header = match iter.next() {
            Ok(Some(h)) => h,
            Ok(None) => break,
            Err(_) => break,
        };
        let unit_offset = header.offset().as_debug_info_offset().map(|o| o.0).unwrap_or(0);
        let unit = match dwarf.unit(header) {
            Ok(u) => u,
            Err(err) => {
                let err = DwarfError {
                    unit_offset,
                    kind: DwarfErrorKind::Abbrev(err.to_string()),
                };
                tracing::warn!(unit_offset, error = %err, "skipping unparseable compilation unit");
                unit_index += 1;
                continue;
            }
        };

        match walk::walk_unit(dwarf, &unit, unit_index, unit_offset) {
            Ok((cu, mut candidates, mut line_rows)) => {
                units.push(cu);
                all_candidates.append(&mut candidates);
                all_line_rows.append(&mut line_rows);
            }
            Err(err) => {
                tracing::warn!(unit_offset, error = %err, "skipping compilation unit after walk failure");
            }
        }
        unit_index += 1;
    }

    let definitions = resolve_definitions(all_candidates, &units);
    all_line_rows.sort_by_key(|r| r.address);
    Ok(DwarfAnalysis {
        units,
        definitions,
        line_rows: all_line_rows,
    })
}
