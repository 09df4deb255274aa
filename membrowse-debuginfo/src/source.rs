//! Resolves `(address, name)` pairs to a source file, falling through the three tiers of
//! §4.4: the DWARF definition/declaration map, the line number program, then plain
//! compilation-unit address containment.

use crate::dwarf::DwarfAnalysis;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceSite {
    pub file: String,
    pub line: Option<u32>,
}

pub struct SourceResolver<'a> {
    analysis: &'a DwarfAnalysis,
    skip_line_program: bool,
}

impl<'a> SourceResolver<'a> {
    pub fn new(analysis: &'a DwarfAnalysis, skip_line_program: bool) -> Self {
        SourceResolver {
            analysis,
            skip_line_program,
        }
    }

    pub fn resolve(&self, address: u64, name: &str) -> Option<SourceSite> {
        self.from_definitions(address, name)
            .or_else(|| self.from_line_program(address))
            .or_else(|| self.from_cu_containment(address))
    }

    fn from_definitions(&self, address: u64, name: &str) -> Option<SourceSite> {
        let site = self.analysis.definitions.get(&(address, name.to_string()))?;
        let cu = self.analysis.units.get(site.cu_index)?;
        let file = cu.file_at(site.file_index)?.to_string();
        Some(SourceSite { file, line: site.line })
    }

    fn from_line_program(&self, address: u64) -> Option<SourceSite> {
        if self.skip_line_program {
            return None;
        }
        let rows = &self.analysis.line_rows;
        // `rows` is sorted by address; find the last row whose address is <= the target.
        let idx = match rows.binary_search_by_key(&address, |r| r.address) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let row = &rows[idx];
        let cu = self.analysis.units.get(row.cu_index)?;
        let file = cu.file_at(row.file_index)?.to_string();
        Some(SourceSite { file, line: row.line })
    }

    fn from_cu_containment(&self, address: u64) -> Option<SourceSite> {
        let cu = self.analysis.units.iter().find(|cu| cu.contains(address))?;
        Some(SourceSite {
            file: cu.name.clone(),
            line: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::{resolve_definitions, Candidate, CandidateKind, CompilationUnit, FileEntry, Language, LineRow};

    fn analysis() -> DwarfAnalysis {
        let cu = CompilationUnit {
            name: "main.c".to_string(),
            comp_dir: "/src".to_string(),
            producer: "gcc".to_string(),
            language: Language::C,
            low_pc: Some(0x100),
            high_pc: Some(0x200),
            file_table: vec![FileEntry::new("main.c".to_string())],
            unit_offset: 0,
        };
        let candidates = vec![Candidate {
            name: "foo".to_string(),
            address: 0x100,
            cu_index: 0,
            file_index: 0,
            line: Some(42),
            die_offset: 1,
            kind: CandidateKind::Definition,
        }];
        let units = vec![cu];
        let definitions = resolve_definitions(candidates, &units);
        DwarfAnalysis {
            units,
            definitions,
            line_rows: vec![LineRow {
                address: 0x150,
                cu_index: 0,
                file_index: 0,
                line: Some(7),
            }],
        }
    }

    #[test]
    fn resolves_via_definition_map_first() {
        let analysis = analysis();
        let resolver = SourceResolver::new(&analysis, false);
        let site = resolver.resolve(0x100, "foo").unwrap();
        assert_eq!(site.file, "main.c");
        assert_eq!(site.line, Some(42));
    }

    #[test]
    fn falls_back_to_line_program() {
        let analysis = analysis();
        let resolver = SourceResolver::new(&analysis, false);
        let site = resolver.resolve(0x160, "unknown_symbol").unwrap();
        assert_eq!(site.line, Some(7));
    }

    #[test]
    fn skip_line_program_falls_back_to_cu_containment() {
        let analysis = analysis();
        let resolver = SourceResolver::new(&analysis, true);
        let site = resolver.resolve(0x160, "unknown_symbol").unwrap();
        assert_eq!(site.file, "main.c");
        assert_eq!(site.line, None);
    }

    #[test]
    fn unresolvable_address_returns_none() {
        let analysis = analysis();
        let resolver = SourceResolver::new(&analysis, true);
        assert!(resolver.resolve(0xffff, "nope").is_none());
    }
}
