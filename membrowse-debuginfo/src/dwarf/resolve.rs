//! Declaration-vs-definition resolution: merges per-CU candidates into one
//! `(address, name) -> definition site` map, deterministically regardless of CU order.

use std::collections::BTreeMap;

use super::CompilationUnit;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CandidateKind {
    /// A real address binding with no `DW_AT_declaration` flag: a true definition.
    Definition,
    /// `DW_AT_declaration = 1`: introduces a name without allocating storage.
    Declaration,
    /// An inlined copy; only used as a fallback when nothing else claims this (address, name).
    Inline,
}

#[derive(Clone, Debug)]
pub struct Candidate {
    pub name: String,
    pub address: u64,
    pub cu_index: usize,
    pub file_index: u64,
    pub line: Option<u32>,
    pub die_offset: usize,
    pub kind: CandidateKind,
}

#[derive(Clone, Copy, Debug)]
pub struct DefinitionSite {
    pub cu_index: usize,
    pub file_index: u64,
    pub line: Option<u32>,
}

/// Applies §4.3's four-step tie-break policy to every `(address, name)` group of
/// candidates. Candidates are first sorted by `(address, die_offset)` so that the result is
/// identical no matter what order compilation units were walked in (the property required
/// for parallel-merge determinism, §5).
pub fn resolve_definitions(
    mut candidates: Vec<Candidate>,
    units: &[CompilationUnit],
) -> BTreeMap<(u64, String), DefinitionSite> {
    candidates.sort_by_key(|c| (c.address, c.die_offset));

    let mut grouped: BTreeMap<(u64, String), Vec<Candidate>> = BTreeMap::new();
    for c in candidates {
        grouped.entry((c.address, c.name.clone())).or_default().push(c);
    }

    let mut out = BTreeMap::new();
    for (key, group) in grouped {
        if let Some(site) = pick_winner(&group, units) {
            out.insert(key, site);
        }
    }
    out
}

fn pick_winner(group: &[Candidate], units: &[CompilationUnit]) -> Option<DefinitionSite> {
    // Step 1: a real definition (address-bound, not a declaration) wins outright.
    let definitions: Vec<&Candidate> = group.iter().filter(|c| c.kind == CandidateKind::Definition).collect();
    if definitions.len() == 1 {
        return Some(site_of(definitions[0]));
    }
    if definitions.len() > 1 {
        // Step 3: weak/inline duplicates disagree; the CU whose [low_pc, high_pc) contains
        // the address wins.
        if let Some(winner) = definitions
            .iter()
            .find(|c| units.get(c.cu_index).map(|cu| cu.contains(c.address)).unwrap_or(false))
        {
            return Some(site_of(winner));
        }
        // Step 4: stable first-writer-wins by DIE-offset order (already sorted).
        return Some(site_of(definitions[0]));
    }

    // Step 2: only declarations exist. If exactly one CU references this name, attribute to
    // that CU's decl_file (header-defined statics with no out-of-line definition visible).
    let declarations: Vec<&Candidate> = group.iter().filter(|c| c.kind == CandidateKind::Declaration).collect();
    if !declarations.is_empty() {
        let distinct_cus: std::collections::BTreeSet<usize> = declarations.iter().map(|c| c.cu_index).collect();
        if distinct_cus.len() == 1 {
            return Some(site_of(declarations[0]));
        }
        return Some(site_of(declarations[0]));
    }

    // Nothing but inlined-subroutine evidence: use it only as a last resort.
    group.first().map(site_of)
}

fn site_of(c: &Candidate) -> DefinitionSite {
    DefinitionSite {
        cu_index: c.cu_index,
        file_index: c.file_index,
        line: c.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::{FileEntry, Language};

    fn cu(index: usize, low: u64, high: u64) -> CompilationUnit {
        CompilationUnit {
            name: format!("cu{index}.c"),
            comp_dir: "/src".to_string(),
            producer: "test".to_string(),
            language: Language::C,
            low_pc: Some(low),
            high_pc: Some(high),
            file_table: vec![FileEntry::new(format!("cu{index}.c"))],
            unit_offset: index,
        }
    }

    fn def(name: &str, address: u64, cu_index: usize, die_offset: usize) -> Candidate {
        Candidate {
            name: name.to_string(),
            address,
            cu_index,
            file_index: 0,
            line: Some(10),
            die_offset,
            kind: CandidateKind::Definition,
        }
    }

    #[test]
    fn single_definition_wins() {
        let units = vec![cu(0, 0, 100)];
        let candidates = vec![def("foo", 10, 0, 1)];
        let map = resolve_definitions(candidates, &units);
        assert!(map.contains_key(&(10, "foo".to_string())));
    }

    #[test]
    fn static_namespace_scoping_keeps_both_addresses() {
        let units = vec![cu(0, 0, 100), cu(1, 100, 200)];
        let candidates = vec![def("foo", 10, 0, 1), def("foo", 110, 1, 2)];
        let map = resolve_definitions(candidates, &units);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&(10, "foo".to_string())].cu_index, 0);
        assert_eq!(map[&(110, "foo".to_string())].cu_index, 1);
    }

    #[test]
    fn cu_containment_breaks_ties_among_duplicate_definitions() {
        let units = vec![cu(0, 0, 50), cu(1, 50, 200)];
        // Same (address, name) claimed by both CUs (e.g. weak/inline duplicate); only CU 1
        // actually contains address 60.
        let candidates = vec![def("foo", 60, 0, 5), def("foo", 60, 1, 1)];
        let map = resolve_definitions(candidates, &units);
        assert_eq!(map[&(60, "foo".to_string())].cu_index, 1);
    }

    #[test]
    fn order_independent_merge() {
        let units = vec![cu(0, 0, 100), cu(1, 100, 200)];
        let forward = vec![def("foo", 10, 0, 1), def("foo", 110, 1, 2)];
        let mut backward = forward.clone();
        backward.reverse();
        let a = resolve_definitions(forward, &units);
        let b = resolve_definitions(backward, &units);
        assert_eq!(
            a.keys().collect::<Vec<_>>(),
            b.keys().collect::<Vec<_>>()
        );
    }
}
