//! The stable JSON wire format (§6.2) and the builder that assembles it from the pipeline's
//! intermediate results.

use std::collections::BTreeMap;

use membrowse_common::{hex_u64, Arch};
use membrowse_debuginfo::dwarf::CompilationUnit as DwarfCompilationUnit;
use membrowse_debuginfo::sections::{Section, SectionFlag, SectionKind};
use membrowse_debuginfo::symbols::{Binding, Symbol, SymbolKind};
use membrowse_linker::{LinkerWarning, MemoryRegion};
use serde::Serialize;

use crate::region_map::{MappedSection, RegionRollup};

/// A `serde`-serializable map that preserves insertion order instead of sorting keys, used
/// for `memory_regions` whose key order must follow linker-script declaration order (§6.2).
#[derive(Debug, Default)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        OrderedMap(Vec::new())
    }

    pub fn push(&mut self, key: String, value: V) {
        self.0.push((key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.0.iter().map(|(k, v)| (k, v))
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
pub struct MemoryRegionReport {
    pub address: String,
    pub size: u64,
    pub used: u64,
    pub utilization: f64,
    pub attrs: String,
    pub parent: Option<String>,
    pub sections: Vec<String>,
    pub auto: bool,
}

#[derive(Debug, Serialize)]
pub struct SectionReport {
    pub name: String,
    pub address: String,
    pub size: u64,
    pub flags: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SymbolReport {
    pub name: String,
    pub demangled: Option<String>,
    pub address: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub binding: String,
    pub section: Option<String>,
    pub region: Option<String>,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CompilationUnitReport {
    pub name: String,
    pub comp_dir: String,
    pub producer: String,
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct WarningReport {
    pub kind: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MetaReport {
    pub elf_sha256: String,
    pub analyzed_at: String,
    pub warnings: Vec<WarningReport>,
}

#[derive(Debug, Serialize)]
pub struct MemoryReport {
    pub schema_version: String,
    pub architecture: Arch,
    pub memory_regions: OrderedMap<MemoryRegionReport>,
    pub sections: Vec<SectionReport>,
    pub symbols: Vec<SymbolReport>,
    pub compilation_units: Vec<CompilationUnitReport>,
    pub meta: MetaReport,
}

fn section_flags(section: &Section) -> Vec<String> {
    section
        .flags
        .iter()
        .map(|f| match f {
            SectionFlag::Alloc => "ALLOC",
            SectionFlag::Exec => "EXEC",
            SectionFlag::Write => "WRITE",
            SectionFlag::Tls => "TLS",
        })
        .map(str::to_string)
        .collect()
}

fn section_kind_name(kind: SectionKind) -> String {
    kind.wire_name()
}

/// One resolved symbol's final `(source_file, source_line)`, supplied by the caller after
/// running [`membrowse_debuginfo::SourceResolver`] over every symbol.
pub struct ResolvedSymbol<'s> {
    pub symbol: &'s Symbol,
    pub source_file: Option<String>,
    pub source_line: Option<u32>,
    pub demangled: Option<String>,
}

pub struct ReportInputs<'a> {
    pub architecture: Arch,
    pub mapped_sections: Vec<MappedSection<'a>>,
    pub region_rollups: BTreeMap<String, RegionRollup>,
    pub regions: &'a [MemoryRegion],
    pub resolved_symbols: Vec<ResolvedSymbol<'a>>,
    pub compilation_units: &'a [DwarfCompilationUnit],
    pub warnings: &'a [LinkerWarning],
    pub elf_sha256: String,
    pub analyzed_at: String,
}

/// Builds the final [`MemoryReport`] from the joined pipeline outputs, applying the
/// deterministic sort order the wire contract requires: `memory_regions` in declaration
/// order, `sections`/`symbols` by `(region, address)` then name (§6.2).
pub fn build_report(inputs: ReportInputs<'_>) -> MemoryReport {
    let ReportInputs {
        architecture,
        mapped_sections,
        region_rollups,
        regions,
        resolved_symbols,
        compilation_units,
        warnings,
        elf_sha256,
        analyzed_at,
    } = inputs;

    let mut memory_regions = OrderedMap::new();
    for region in regions {
        let rollup = region_rollups.get(&region.name);
        memory_regions.push(
            region.name.clone(),
            MemoryRegionReport {
                address: hex_u64(region.origin),
                size: region.length,
                used: rollup.map(|r| r.used).unwrap_or(0),
                utilization: rollup.map(|r| r.utilization).unwrap_or(0.0),
                attrs: region.attrs.clone(),
                parent: region.parent.clone(),
                sections: rollup.map(|r| r.sections.clone()).unwrap_or_default(),
                auto: region.auto,
            },
        );
    }
    if let Some(rollup) = region_rollups.get(crate::region_map::UNMAPPED_BUCKET) {
        memory_regions.push(
            crate::region_map::UNMAPPED_BUCKET.to_string(),
            MemoryRegionReport {
                address: hex_u64(0),
                size: 0,
                used: rollup.used,
                utilization: 0.0,
                attrs: String::new(),
                parent: None,
                sections: rollup.sections.clone(),
                auto: true,
            },
        );
    }

    let mut sections: Vec<SectionReport> = mapped_sections
        .iter()
        .map(|mapped| SectionReport {
            name: mapped.section.name.clone(),
            address: hex_u64(mapped.section.address),
            size: mapped.section.size,
            flags: section_flags(mapped.section),
            kind: section_kind_name(mapped.section.kind),
            region: mapped.region.clone(),
        })
        .collect();
    sections.sort_by(|a, b| {
        (a.region.clone(), &a.address, &a.name).cmp(&(b.region.clone(), &b.address, &b.name))
    });

    let mut symbols: Vec<SymbolReport> = resolved_symbols
        .iter()
        .map(|r| {
            let region = mapped_sections
                .iter()
                .find(|m| Some(&m.section.name) == r.symbol.section_name.as_ref())
                .and_then(|m| m.region.clone());
            SymbolReport {
                name: r.symbol.name.clone(),
                demangled: r.demangled.clone(),
                address: hex_u64(r.symbol.address),
                size: r.symbol.size,
                kind: symbol_kind_name(r.symbol.kind),
                binding: binding_name(r.symbol.binding),
                section: r.symbol.section_name.clone(),
                region,
                source_file: r.source_file.clone(),
                source_line: r.source_line,
            }
        })
        .collect();
    symbols.sort_by(|a, b| {
        (a.region.clone(), &a.address, &a.name).cmp(&(b.region.clone(), &b.address, &b.name))
    });

    let compilation_units = compilation_units
        .iter()
        .map(|cu| CompilationUnitReport {
            name: cu.name.clone(),
            comp_dir: cu.comp_dir.clone(),
            producer: cu.producer.clone(),
            language: cu.language.wire_name().to_string(),
        })
        .collect();

    let warnings = warnings
        .iter()
        .map(|w| WarningReport {
            kind: w.kind.as_str().to_string(),
            message: w.message.clone(),
            file: w.file.clone(),
            line: w.line,
        })
        .collect();

    MemoryReport {
        schema_version: "1.0".to_string(),
        architecture,
        memory_regions,
        sections,
        symbols,
        compilation_units,
        meta: MetaReport {
            elf_sha256,
            analyzed_at,
            warnings,
        },
    }
}

fn symbol_kind_name(kind: SymbolKind) -> String {
    kind.wire_name().to_string()
}

fn binding_name(binding: Binding) -> String {
    binding.wire_name().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn ordered_map_preserves_insertion_order() {
        let mut map = OrderedMap::new();
        map.push("RAM".to_string(), 1u32);
        map.push("FLASH".to_string(), 2u32);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.find("RAM").unwrap() < json.find("FLASH").unwrap());
    }

    #[test]
    fn region_report_hex_formats_address() {
        let region = MemoryRegionReport {
            address: hex_u64(0x0800_0000),
            size: 1024,
            used: 10,
            utilization: 1.0,
            attrs: "rx".to_string(),
            parent: None,
            sections: vec![],
            auto: false,
        };
        assert_eq!(region.address, "0x8000000");
    }
}
