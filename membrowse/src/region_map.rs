//! Assigns every ELF section to exactly one memory region and rolls up per-region
//! utilization (§4.5).

use std::collections::BTreeMap;

use membrowse_debuginfo::sections::{Section, SectionKind};
use membrowse_linker::{MemoryRegion, RegionKind};

pub const UNMAPPED_BUCKET: &str = "__unmapped__";

/// A section after region assignment, carrying the `sizeOnDevice` the NOBITS/ROM exclusion
/// rule (§4.5) produces.
pub struct MappedSection<'s> {
    pub section: &'s Section,
    pub region: Option<String>,
    pub size_on_device: u64,
}

pub struct RegionRollup {
    pub used: u64,
    pub utilization: f64,
    pub sections: Vec<String>,
}

/// Picks the most-specific (smallest `length`) region whose address range contains
/// `address`, among possibly-nested candidates.
fn best_match<'r>(address: u64, regions: &'r [MemoryRegion]) -> Option<&'r MemoryRegion> {
    regions
        .iter()
        .filter(|r| r.length > 0 && address >= r.origin && address < r.end())
        .min_by_key(|r| r.length)
}

fn size_on_device(section: &Section, region: Option<&MemoryRegion>) -> u64 {
    match section.kind {
        SectionKind::Nobits => match region {
            Some(r) if r.kind == RegionKind::Ram => section.size,
            Some(_) => 0,
            None => section.size,
        },
        _ => section.size,
    }
}

/// Maps every section to a region and rolls up `used`/`utilization`/member lists per
/// region, including the synthetic `__unmapped__` bucket for sections matching no region.
pub fn map_sections<'s>(
    sections: &'s [Section],
    regions: &[MemoryRegion],
) -> (Vec<MappedSection<'s>>, BTreeMap<String, RegionRollup>) {
    let mut mapped = Vec::with_capacity(sections.len());
    let mut used_by_region: BTreeMap<String, u64> = BTreeMap::new();
    let mut sections_by_region: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for section in sections {
        let matched = best_match(section.address, regions);
        let region_name = matched.map(|r| r.name.clone());
        let sod = size_on_device(section, matched);

        let bucket = region_name.clone().unwrap_or_else(|| UNMAPPED_BUCKET.to_string());
        *used_by_region.entry(bucket.clone()).or_insert(0) += sod;
        sections_by_region.entry(bucket).or_default().push(section.name.clone());

        mapped.push(MappedSection {
            section,
            region: region_name,
            size_on_device: sod,
        });
    }

    let mut rollups = BTreeMap::new();
    for region in regions {
        let used = used_by_region.get(&region.name).copied().unwrap_or(0);
        rollups.insert(
            region.name.clone(),
            RegionRollup {
                used,
                utilization: membrowse_common::utilization_percent(used, region.length),
                sections: sections_by_region.get(&region.name).cloned().unwrap_or_default(),
            },
        );
    }
    if let Some(unmapped) = sections_by_region.get(UNMAPPED_BUCKET) {
        rollups.insert(
            UNMAPPED_BUCKET.to_string(),
            RegionRollup {
                used: used_by_region.get(UNMAPPED_BUCKET).copied().unwrap_or(0),
                utilization: 0.0,
                sections: unmapped.clone(),
            },
        );
    }

    (mapped, rollups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use membrowse_debuginfo::sections::SectionFlag;

    fn section(name: &str, address: u64, size: u64, kind: SectionKind) -> Section {
        Section {
            name: name.to_string(),
            address,
            size,
            flags: vec![SectionFlag::Alloc],
            kind,
        }
    }

    fn region(name: &str, origin: u64, length: u64, kind: RegionKind) -> MemoryRegion {
        MemoryRegion {
            name: name.to_string(),
            origin,
            length,
            attrs: match kind {
                RegionKind::Rom => "rx".to_string(),
                RegionKind::Ram => "rwx".to_string(),
            },
            kind,
            parent: None,
            auto: false,
        }
    }

    #[test]
    fn assigns_sections_to_containing_region() {
        let sections = vec![section(".text", 0x1000, 100, SectionKind::Progbits)];
        let regions = vec![region("FLASH", 0x1000, 0x10000, RegionKind::Rom)];
        let (mapped, rollups) = map_sections(&sections, &regions);
        assert_eq!(mapped[0].region.as_deref(), Some("FLASH"));
        assert_eq!(rollups["FLASH"].used, 100);
    }

    #[test]
    fn nobits_excluded_from_rom_used() {
        let sections = vec![section(".bss_in_rom", 0x1000, 200, SectionKind::Nobits)];
        let regions = vec![region("FLASH", 0x1000, 0x10000, RegionKind::Rom)];
        let (mapped, rollups) = map_sections(&sections, &regions);
        assert_eq!(mapped[0].size_on_device, 0);
        assert_eq!(rollups["FLASH"].used, 0);
    }

    #[test]
    fn nobits_counts_in_ram() {
        let sections = vec![section(".bss", 0x2000, 200, SectionKind::Nobits)];
        let regions = vec![region("RAM", 0x2000, 0x10000, RegionKind::Ram)];
        let (_, rollups) = map_sections(&sections, &regions);
        assert_eq!(rollups["RAM"].used, 200);
    }

    #[test]
    fn unmapped_sections_bucketed() {
        let sections = vec![section(".weird", 0xffff_0000, 16, SectionKind::Progbits)];
        let regions = vec![region("FLASH", 0x1000, 0x10000, RegionKind::Rom)];
        let (mapped, rollups) = map_sections(&sections, &regions);
        assert_eq!(mapped[0].region, None);
        assert_eq!(rollups[UNMAPPED_BUCKET].used, 16);
    }

    #[test]
    fn hierarchical_region_picks_smallest() {
        let sections = vec![section(".boot", 0x0, 10, SectionKind::Progbits)];
        let regions = vec![
            region("FLASH", 0x0, 1000, RegionKind::Rom),
            region("FLASH_BOOT", 0x0, 100, RegionKind::Rom),
        ];
        let (mapped, _) = map_sections(&sections, &regions);
        assert_eq!(mapped[0].region.as_deref(), Some("FLASH_BOOT"));
    }
}
