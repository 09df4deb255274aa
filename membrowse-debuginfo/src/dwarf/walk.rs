//! DIE-tree walk for a single compilation unit: builds its file table and collects
//! definition/declaration candidates for every `subprogram`/`variable`/`inlined_subroutine`
//! DIE worth keeping.

use gimli::{AttributeValue, DebuggingInformationEntry, Dwarf, Operation, Unit};

use super::resolve::{Candidate, CandidateKind};
use super::{CompilationUnit, FileEntry, Language, LineRow, Reader};
use crate::error::{DwarfError, DwarfErrorKind};

pub fn walk_unit<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    cu_index: usize,
    unit_offset: usize,
) -> Result<(CompilationUnit, Vec<Candidate>, Vec<LineRow>), DwarfError> {
    let map_err = |kind: DwarfErrorKind| DwarfError { unit_offset, kind };

    let mut cursor = unit.entries();
    let root = cursor
        .next_dfs()
        .map_err(|e| map_err(DwarfErrorKind::DieTree(e.to_string())))?
        .map(|(_, die)| die.clone())
        .ok_or_else(|| map_err(DwarfErrorKind::DieTree("missing root DIE".to_string())))?;

    let name = attr_string(dwarf, unit, &root, gimli::DW_AT_name).unwrap_or_default();
    let comp_dir = attr_string(dwarf, unit, &root, gimli::DW_AT_comp_dir).unwrap_or_default();
    let producer = attr_string(dwarf, unit, &root, gimli::DW_AT_producer).unwrap_or_default();
    let language = root
        .attr_value(gimli::DW_AT_language)
        .ok()
        .flatten()
        .and_then(|v| match v {
            AttributeValue::Language(lang) => Some(Language::from_dw_lang(lang)),
            _ => None,
        })
        .unwrap_or(Language::Other);

    let low_pc = low_pc_of(dwarf, unit, &root);
    let high_pc = low_pc.and_then(|lo| high_pc_of(&root, lo));

    let file_table = build_file_table(dwarf, unit, &name, &comp_dir).map_err(|e| map_err(DwarfErrorKind::LineProgram(e)))?;
    let line_rows = build_line_rows(unit, cu_index).map_err(|e| map_err(DwarfErrorKind::LineProgram(e)))?;

    let cu = CompilationUnit {
        name,
        comp_dir,
        producer,
        language,
        low_pc,
        high_pc,
        file_table,
        unit_offset,
    };

    let mut candidates = Vec::new();
    let mut cursor = unit.entries();
    let mut depth = 0i64;
    let mut in_subprogram_depth: Option<i64> = None;

    loop {
        let next = cursor
            .next_dfs()
            .map_err(|e| map_err(DwarfErrorKind::DieTree(e.to_string())))?;
        let Some((delta, die)) = next else { break };
        depth += delta;

        if let Some(sub_depth) = in_subprogram_depth {
            if depth <= sub_depth {
                in_subprogram_depth = None;
            }
        }

        match die.tag() {
            gimli::DW_TAG_subprogram => {
                in_subprogram_depth = Some(depth);
                if let Some(address) = low_pc_of(dwarf, unit, die) {
                    let decl_file = die.attr_value(gimli::DW_AT_decl_file).ok().flatten().and_then(as_udata);
                    let decl_line = die.attr_value(gimli::DW_AT_decl_line).ok().flatten().and_then(as_udata);
                    if let (Some(name), Some(file_index)) =
                        (attr_string(dwarf, unit, die, gimli::DW_AT_name), decl_file)
                    {
                        candidates.push(Candidate {
                            name,
                            address,
                            cu_index,
                            file_index,
                            line: decl_line.map(|l| l as u32),
                            die_offset: die.offset().0,
                            kind: CandidateKind::Definition,
                        });
                    }
                }
            }
            gimli::DW_TAG_variable if in_subprogram_depth.is_none() => {
                let is_declaration = die
                    .attr_value(gimli::DW_AT_declaration)
                    .ok()
                    .flatten()
                    .map(|v| matches!(v, AttributeValue::Flag(true)))
                    .unwrap_or(false);

                let address = location_address(dwarf, unit, die);
                let decl_file = die.attr_value(gimli::DW_AT_decl_file).ok().flatten().and_then(as_udata);
                let decl_line = die.attr_value(gimli::DW_AT_decl_line).ok().flatten().and_then(as_udata);
                let Some(name) = attr_string(dwarf, unit, die, gimli::DW_AT_name) else {
                    continue;
                };
                let Some(file_index) = decl_file else { continue };

                match (address, is_declaration) {
                    (Some(address), false) => candidates.push(Candidate {
                        name,
                        address,
                        cu_index,
                        file_index,
                        line: decl_line.map(|l| l as u32),
                        die_offset: die.offset().0,
                        kind: CandidateKind::Definition,
                    }),
                    (_, true) => candidates.push(Candidate {
                        name,
                        address: address.unwrap_or(0),
                        cu_index,
                        file_index,
                        line: decl_line.map(|l| l as u32),
                        die_offset: die.offset().0,
                        kind: CandidateKind::Declaration,
                    }),
                    _ => {}
                }
            }
            gimli::DW_TAG_inlined_subroutine => {
                if let Some(address) = low_pc_of(dwarf, unit, die) {
                    if let Some(name) = attr_string(dwarf, unit, die, gimli::DW_AT_name)
                        .or_else(|| inline_origin_name(dwarf, unit, die))
                    {
                        let decl_file = die.attr_value(gimli::DW_AT_decl_file).ok().flatten().and_then(as_udata);
                        let decl_line = die.attr_value(gimli::DW_AT_decl_line).ok().flatten().and_then(as_udata);
                        if let Some(file_index) = decl_file {
                            candidates.push(Candidate {
                                name,
                                address,
                                cu_index,
                                file_index,
                                line: decl_line.map(|l| l as u32),
                                die_offset: die.offset().0,
                                kind: CandidateKind::Inline,
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok((cu, candidates, line_rows))
}

/// Collects `(address, file_index, line)` rows from the CU's line number program, used by
/// the source resolver's second-tier lookup when the DWARF definition/declaration map has
/// no entry for an address (§4.4).
fn build_line_rows<'a>(unit: &Unit<Reader<'a>>, cu_index: usize) -> Result<Vec<LineRow>, String> {
    let Some(program) = unit.line_program.clone() else {
        return Ok(Vec::new());
    };
    let mut rows = Vec::new();
    let mut state_rows = program.rows();
    while let Ok(Some((_, row))) = state_rows.next_row() {
        if row.end_sequence() {
            continue;
        }
        rows.push(LineRow {
            address: row.address(),
            cu_index,
            file_index: row.file_index(),
            line: row.line().map(|l| l.get() as u32),
        });
    }
    Ok(rows)
}

fn inline_origin_name<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    die: &DebuggingInformationEntry<Reader<'a>>,
) -> Option<String> {
    // DW_TAG_inlined_subroutine usually carries its name only via DW_AT_abstract_origin;
    // resolving the full reference chain is not attempted here, this is a best-effort tag.
    let _ = (dwarf, unit, die);
    None
}

fn as_udata(v: AttributeValue<Reader<'_>>) -> Option<u64> {
    v.udata_value()
}

fn attr_string<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    die: &DebuggingInformationEntry<Reader<'a>>,
    attr: gimli::DwAt,
) -> Option<String> {
    let value = die.attr_value(attr).ok().flatten()?;
    let r = dwarf.attr_string(unit, value).ok()?;
    Some(String::from_utf8_lossy(r.slice()).into_owned())
}

fn low_pc_of<'a>(dwarf: &Dwarf<Reader<'a>>, unit: &Unit<Reader<'a>>, die: &DebuggingInformationEntry<Reader<'a>>) -> Option<u64> {
    if let Ok(Some(AttributeValue::Addr(addr))) = die.attr_value(gimli::DW_AT_low_pc) {
        return Some(addr);
    }
    // DWARF5 non-contiguous ranges: fall back to the first range's start address.
    let ranges_attr = die.attr_value(gimli::DW_AT_ranges).ok().flatten()?;
    let AttributeValue::RangeListsRef(raw) = ranges_attr else {
        return None;
    };
    let offset = dwarf.ranges_offset(unit, raw).ok()?;
    let mut iter = dwarf.ranges(unit, offset).ok()?;
    iter.next().ok().flatten().map(|r| r.begin)
}

fn high_pc_of<'a>(die: &DebuggingInformationEntry<Reader<'a>>, low_pc: u64) -> Option<u64> {
    match die.attr_value(gimli::DW_AT_high_pc).ok().flatten()? {
        AttributeValue::Addr(addr) => Some(addr),
        other => other.udata_value().map(|offset| low_pc + offset),
    }
}

/// Resolves `DW_AT_location` to an absolute address, recognizing only `DW_OP_addr` and
/// `DW_OP_addrx` (resolved through `.debug_addr`). Register/frame-based locations and
/// `DW_OP_piece` compositions are not global bindings and are ignored (§4.3).
fn location_address<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    die: &DebuggingInformationEntry<Reader<'a>>,
) -> Option<u64> {
    let value = die.attr_value(gimli::DW_AT_location).ok().flatten()?;
    let AttributeValue::Exprloc(expr) = value else {
        return None;
    };
    let mut ops = expr.operations(unit.encoding());
    while let Ok(Some(op)) = ops.next() {
        match op {
            Operation::Address { address } => return Some(address),
            Operation::AddressIndex { index } => {
                return dwarf.address(unit, index).ok();
            }
            _ => continue,
        }
    }
    None
}

fn build_file_table<'a>(
    dwarf: &Dwarf<Reader<'a>>,
    unit: &Unit<Reader<'a>>,
    cu_name: &str,
    comp_dir: &str,
) -> Result<Vec<FileEntry>, String> {
    let Some(program) = unit.line_program.clone() else {
        return Ok(Vec::new());
    };
    let header = program.header();
    let version = unit.version();
    let mut table = Vec::new();

    if version <= 4 {
        // Index 0 is reserved/unused in DWARF <=4's file_names table; the implicit "current
        // file" is the CU's own primary source name.
        table.push(FileEntry::new(cu_name.to_string()));
    }

    for entry in header.file_names() {
        let file_name = dwarf
            .attr_string(unit, entry.path_name())
            .map(|r| String::from_utf8_lossy(r.slice()).into_owned())
            .unwrap_or_default();

        let dir = header
            .directory(entry.directory_index())
            .and_then(|d| dwarf.attr_string(unit, d).ok())
            .map(|r| String::from_utf8_lossy(r.slice()).into_owned())
            .unwrap_or_default();

        let full = if file_name.starts_with('/') || dir.is_empty() {
            file_name
        } else if dir.starts_with('/') {
            format!("{dir}/{file_name}")
        } else if comp_dir.is_empty() {
            format!("{dir}/{file_name}")
        } else {
            format!("{comp_dir}/{dir}/{file_name}")
        };

        table.push(FileEntry::new(full));
    }

    Ok(table)
}
