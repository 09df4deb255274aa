//! Resolves `MEMORY` declarations (across possibly several concatenated script files) into
//! a canonical, hierarchy-aware list of named memory regions.

use std::collections::BTreeMap;

use membrowse_common::Arch;

use crate::ast::{AssignOp, Expr, Stmt};
use crate::error::{LinkerEvalError, LinkerWarning, LinkerWarningKind};
use crate::eval::{Env, Evaluator, RegionGeometry};

/// Whether a region is backed by non-volatile storage (flash/ROM, non-writable) or RAM.
/// Derived from the GNU ld attribute string (`rx`, `rwx`, `r`, ...): a region without the
/// `w` attribute is treated as ROM for the NOBITS/`.bss` accounting rule in the region
/// mapper (§4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegionKind {
    Rom,
    Ram,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryRegion {
    pub name: String,
    pub origin: u64,
    pub length: u64,
    pub attrs: String,
    pub kind: RegionKind,
    pub parent: Option<String>,
    /// `true` when this region was synthesized by the default-region fallback (§4.6)
    /// rather than parsed from a script.
    pub auto: bool,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.origin.saturating_add(self.length)
    }

    pub fn contains_range(&self, other: &MemoryRegion) -> bool {
        other.origin >= self.origin && other.end() <= self.end() && self.length > other.length
    }

    pub fn overlaps(&self, other: &MemoryRegion) -> bool {
        self.origin < other.end() && other.origin < self.end()
    }
}

fn region_kind(attrs: &str) -> RegionKind {
    if attrs.to_ascii_lowercase().contains('w') {
        RegionKind::Ram
    } else {
        RegionKind::Rom
    }
}

/// Runs pass 1 (MEMORY declarations and top-level assignments) over a sequence of
/// already-parsed scripts, in file order, and returns the resolved regions plus any
/// warnings raised along the way (duplicate region names, suspicious/non-nesting overlaps).
/// Top-level assignments are evaluated leniently so forward references don't abort the
/// whole file, but a `MEMORY` block's `ORIGIN`/`LENGTH` are evaluated strictly: an
/// undefined symbol there fails fast with `LinkerEvalErrorKind::UndefinedSymbol` naming it,
/// unless it's only ever consulted through `DEFINED()` (§4.2).
pub fn resolve_regions(
    scripts: &[crate::ast::Script],
    arch: Arch,
    overrides: BTreeMap<String, i64>,
) -> Result<(Vec<MemoryRegion>, Vec<LinkerWarning>), LinkerEvalError> {
    let mut env = Env::new(arch).with_overrides(overrides);
    let mut warnings = Vec::new();
    // name -> (region, declaring file/line), in first-seen order for stable output.
    let mut order: Vec<String> = Vec::new();
    let mut by_name: BTreeMap<String, MemoryRegion> = BTreeMap::new();

    for script in scripts {
        apply_top_level_assignments(script, &mut env)?;
        collect_unknown_directives(script, &mut warnings);

        for stmt in &script.stmts {
            let Stmt::Memory(blocks) = stmt else { continue };
            for block in blocks {
                let evaluator = Evaluator {
                    env: &env,
                    file: &script.file,
                    line: block.line,
                    lenient: false,
                };
                let origin = evaluator.eval(&block.origin)?.max(0) as u64;
                let length = evaluator.eval(&block.length)?.max(0) as u64;
                let kind = region_kind(&block.attrs);
                env.define_region(&block.name, RegionGeometry {
                    origin: origin as i64,
                    length: length as i64,
                });

                if by_name.contains_key(&block.name) {
                    tracing::warn!(region = %block.name, file = %script.file, line = block.line, "duplicate memory region, last definition wins");
                    warnings.push(
                        LinkerWarning::new(
                            LinkerWarningKind::DuplicateRegion,
                            format!("memory region {:?} redefined, last definition wins", block.name),
                        )
                        .at(script.file.clone(), block.line),
                    );
                } else {
                    order.push(block.name.clone());
                }

                by_name.insert(
                    block.name.clone(),
                    MemoryRegion {
                        name: block.name.clone(),
                        origin,
                        length,
                        attrs: block.attrs.clone(),
                        kind,
                        parent: None,
                        auto: false,
                    },
                );
            }
        }
    }

    let mut regions: Vec<MemoryRegion> = order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect();

    assign_hierarchy(&mut regions, &mut warnings);

    Ok((regions, warnings))
}

/// Evaluates every top-level (outside `MEMORY`/`SECTIONS`) assignment so that later
/// `MEMORY` blocks in the same or a later file can reference symbols bound earlier, per
/// §4.7's `TopLevel` state.
fn apply_top_level_assignments(script: &crate::ast::Script, env: &mut Env) -> Result<(), LinkerEvalError> {
    for stmt in &script.stmts {
        let Stmt::Assign(assignment) = stmt else { continue };
        let evaluator = Evaluator {
            env,
            file: &script.file,
            line: assignment.line,
            lenient: true,
        };
        let rhs = evaluator.eval(&assignment.value)?;
        let current = env.lookup(&assignment.name).unwrap_or(0);
        let value = match assignment.op {
            AssignOp::Set => rhs,
            AssignOp::AddSet => current + rhs,
            AssignOp::SubSet => current - rhs,
            AssignOp::MulSet => current * rhs,
            AssignOp::DivSet => {
                if rhs == 0 {
                    current
                } else {
                    current / rhs
                }
            }
        };
        env.set(assignment.name.clone(), value);
    }
    Ok(())
}

/// Flags every directive this crate parsed but does not recognize by name, per the
/// `LinkerWarningKind::UnknownDirective` tier of the error taxonomy.
fn collect_unknown_directives(script: &crate::ast::Script, warnings: &mut Vec<LinkerWarning>) {
    for stmt in &script.stmts {
        let Stmt::Directive { name, line } = stmt else { continue };
        if crate::parser::is_known_directive(name) {
            continue;
        }
        tracing::warn!(directive = %name, file = %script.file, line, "unrecognized linker script directive");
        warnings.push(
            LinkerWarning::new(
                LinkerWarningKind::UnknownDirective,
                format!("unrecognized directive {name:?}"),
            )
            .at(script.file.clone(), *line),
        );
    }
}

/// Detects parent/child nesting (one region's range is a proper subset of another's) and
/// flags any remaining overlap that isn't clean nesting as a warning rather than a hard
/// error, since vendor scripts occasionally declare intentionally-overlapping aliases.
fn assign_hierarchy(regions: &mut [MemoryRegion], warnings: &mut Vec<LinkerWarning>) {
    let snapshot: Vec<MemoryRegion> = regions.to_vec();
    for region in regions.iter_mut() {
        if region.length == 0 {
            continue;
        }
        let mut best_parent: Option<&MemoryRegion> = None;
        for candidate in &snapshot {
            if candidate.name == region.name || candidate.length == 0 {
                continue;
            }
            if candidate.contains_range(region) {
                match best_parent {
                    Some(current) if current.length <= candidate.length => {}
                    _ => best_parent = Some(candidate),
                }
            }
        }
        if let Some(parent) = best_parent {
            region.parent = Some(parent.name.clone());
        }
    }

    for i in 0..snapshot.len() {
        for j in (i + 1)..snapshot.len() {
            let a = &snapshot[i];
            let b = &snapshot[j];
            if a.length == 0 || b.length == 0 || !a.overlaps(b) {
                continue;
            }
            let nested = a.contains_range(b) || b.contains_range(a);
            if !nested {
                tracing::warn!(a = %a.name, b = %b.name, "memory regions overlap without nesting");
                warnings.push(LinkerWarning::new(
                    LinkerWarningKind::SuspiciousHierarchy,
                    format!(
                        "memory regions {:?} and {:?} overlap without one nesting inside the other",
                        a.name, b.name
                    ),
                ));
            }
        }
    }
}

/// The address range and flags of an allocated ELF section, as needed to synthesize the
/// default `Code`/`Data` regions below without this crate depending on the ELF section
/// type itself.
#[derive(Clone, Copy, Debug)]
pub struct SectionGeometry {
    pub address: u64,
    pub size: u64,
    pub exec: bool,
    pub write: bool,
}

fn bounding_range(
    sections: &[SectionGeometry],
    member: impl Fn(&SectionGeometry) -> bool,
) -> Option<(u64, u64)> {
    sections.iter().filter(|s| member(s)).fold(None, |acc, s| {
        let end = s.address.saturating_add(s.size);
        match acc {
            None => Some((s.address, end)),
            Some((lo, hi)) => Some((lo.min(s.address), hi.max(end))),
        }
    })
}

/// Synthesizes the default `Code`/`Data` regions used when no linker scripts are supplied
/// at all (§4.6): `Code` is the union of `ALLOC|EXEC` sections, `Data` the union of
/// `ALLOC|WRITE` sections, each region's `origin` the min member address and `length` the
/// span from that origin to the furthest member's end. A bucket with no matching sections
/// becomes a zero-length region at address 0.
pub fn default_regions(sections: &[SectionGeometry]) -> Vec<MemoryRegion> {
    let code = bounding_range(sections, |s| s.exec);
    let data = bounding_range(sections, |s| s.write);
    vec![
        MemoryRegion {
            name: "Code".to_string(),
            origin: code.map_or(0, |(lo, _)| lo),
            length: code.map_or(0, |(lo, hi)| hi - lo),
            attrs: "rx".to_string(),
            kind: RegionKind::Rom,
            parent: None,
            auto: true,
        },
        MemoryRegion {
            name: "Data".to_string(),
            origin: data.map_or(0, |(lo, _)| lo),
            length: data.map_or(0, |(lo, hi)| hi - lo),
            attrs: "rw".to_string(),
            kind: RegionKind::Ram,
            parent: None,
            auto: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;
    use similar_asserts::assert_eq;

    #[test]
    fn resolves_simple_memory_map() {
        let script = parse_script(
            "a.ld",
            "MEMORY\n{\n  FLASH (rx) : ORIGIN = 0x08000000, LENGTH = 512K\n  RAM (rwx) : ORIGIN = 0x20000000, LENGTH = 128K\n}\n",
        )
        .unwrap();
        let (regions, warnings) = resolve_regions(&[script], Arch::Arm, BTreeMap::new()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "FLASH");
        assert_eq!(regions[0].origin, 0x0800_0000);
        assert_eq!(regions[0].kind, RegionKind::Rom);
        assert_eq!(regions[1].kind, RegionKind::Ram);
    }

    #[test]
    fn duplicate_region_last_wins_with_warning() {
        let a = parse_script("a.ld", "MEMORY { FLASH (rx) : ORIGIN = 0x0, LENGTH = 1K }").unwrap();
        let b = parse_script("b.ld", "MEMORY { FLASH (rx) : ORIGIN = 0x1000, LENGTH = 2K }").unwrap();
        let (regions, warnings) = resolve_regions(&[a, b], Arch::Unknown, BTreeMap::new()).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].origin, 0x1000);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, LinkerWarningKind::DuplicateRegion);
    }

    #[test]
    fn nested_region_gets_parent() {
        let script = parse_script(
            "a.ld",
            "MEMORY\n{\n  FLASH (rx) : ORIGIN = 0x0, LENGTH = 1000\n  FLASH_BOOT (rx) : ORIGIN = 0x0, LENGTH = 100\n}\n",
        )
        .unwrap();
        let (regions, warnings) = resolve_regions(&[script], Arch::Unknown, BTreeMap::new()).unwrap();
        assert!(warnings.is_empty());
        let boot = regions.iter().find(|r| r.name == "FLASH_BOOT").unwrap();
        assert_eq!(boot.parent.as_deref(), Some("FLASH"));
    }

    #[test]
    fn non_nested_overlap_is_a_warning() {
        let script = parse_script(
            "a.ld",
            "MEMORY\n{\n  A (rx) : ORIGIN = 0x0, LENGTH = 100\n  B (rx) : ORIGIN = 0x50, LENGTH = 100\n}\n",
        )
        .unwrap();
        let (_, warnings) = resolve_regions(&[script], Arch::Unknown, BTreeMap::new()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, LinkerWarningKind::SuspiciousHierarchy);
    }

    #[test]
    fn unrecognized_directive_call_is_a_warning() {
        let script = parse_script(
            "a.ld",
            "FOOBAR(1, 2);\nMEMORY { FLASH (rx) : ORIGIN = 0x0, LENGTH = 100 }\n",
        )
        .unwrap();
        let (regions, warnings) = resolve_regions(&[script], Arch::Unknown, BTreeMap::new()).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, LinkerWarningKind::UnknownDirective);
    }

    #[test]
    fn default_regions_computed_from_sections() {
        let sections = vec![
            SectionGeometry { address: 0x0800_0000, size: 0x100, exec: true, write: false },
            SectionGeometry { address: 0x0800_0200, size: 0x100, exec: true, write: false },
            SectionGeometry { address: 0x2000_0000, size: 0x40, exec: false, write: true },
        ];
        let regions = default_regions(&sections);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.auto));

        let code = regions.iter().find(|r| r.name == "Code").unwrap();
        assert_eq!(code.origin, 0x0800_0000);
        assert_eq!(code.length, 0x0800_0300 - 0x0800_0000);

        let data = regions.iter().find(|r| r.name == "Data").unwrap();
        assert_eq!(data.origin, 0x2000_0000);
        assert_eq!(data.length, 0x40);
    }

    #[test]
    fn default_regions_empty_bucket_is_zero_length() {
        let sections = vec![SectionGeometry { address: 0x1000, size: 0x10, exec: true, write: false }];
        let regions = default_regions(&sections);
        let data = regions.iter().find(|r| r.name == "Data").unwrap();
        assert_eq!(data.origin, 0);
        assert_eq!(data.length, 0);
    }

    #[test]
    fn undefined_symbol_in_origin_fails_fast() {
        let script = parse_script(
            "a.ld",
            "MEMORY { FLASH (rx) : ORIGIN = __flash_origin__, LENGTH = 1K }",
        )
        .unwrap();
        let err = resolve_regions(&[script], Arch::Unknown, BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err.kind,
            crate::error::LinkerEvalErrorKind::UndefinedSymbol(ref name) if name == "__flash_origin__"
        ));
    }

    #[test]
    fn defined_guard_around_undefined_symbol_does_not_fail() {
        let script = parse_script(
            "a.ld",
            "MEMORY { FLASH (rx) : ORIGIN = DEFINED(__flash_origin__) ? __flash_origin__ : 0x0, LENGTH = 1K }",
        )
        .unwrap();
        let (regions, warnings) = resolve_regions(&[script], Arch::Unknown, BTreeMap::new()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(regions[0].origin, 0);
    }
}
