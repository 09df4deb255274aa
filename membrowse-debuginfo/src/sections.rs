//! Enumerates allocated ELF sections.

use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_TLS, SHF_WRITE, SHT_NOBITS, SHT_NOTE, SHT_PROGBITS};
use goblin::elf::Elf;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SectionFlag {
    Alloc,
    Exec,
    Write,
    Tls,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SectionKind {
    Progbits,
    Nobits,
    Note,
    Other(u32),
}

impl SectionKind {
    pub fn wire_name(self) -> String {
        match self {
            SectionKind::Progbits => "PROGBITS".to_string(),
            SectionKind::Nobits => "NOBITS".to_string(),
            SectionKind::Note => "NOTE".to_string(),
            SectionKind::Other(raw) => format!("OTHER({raw:#x})"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub flags: Vec<SectionFlag>,
    pub kind: SectionKind,
}

impl Section {
    pub fn has_flag(&self, flag: SectionFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Scans `elf`'s section headers, keeping only allocated (`SHF_ALLOC`) sections: these are
/// the only ones that occupy target memory and so are the only ones a region mapping is
/// meaningful for.
pub fn scan_allocated_sections(elf: &Elf<'_>) -> Vec<Section> {
    let mut sections = Vec::new();
    for shdr in &elf.section_headers {
        if shdr.sh_flags as u32 & SHF_ALLOC == 0 {
            continue;
        }
        let name = elf
            .shdr_strtab
            .get_at(shdr.sh_name)
            .unwrap_or("<unnamed>")
            .to_string();

        let mut flags = Vec::new();
        flags.push(SectionFlag::Alloc);
        if shdr.sh_flags as u32 & SHF_EXECINSTR != 0 {
            flags.push(SectionFlag::Exec);
        }
        if shdr.sh_flags as u32 & SHF_WRITE != 0 {
            flags.push(SectionFlag::Write);
        }
        if shdr.sh_flags as u32 & SHF_TLS != 0 {
            flags.push(SectionFlag::Tls);
        }

        let kind = match shdr.sh_type {
            SHT_PROGBITS => SectionKind::Progbits,
            SHT_NOBITS => SectionKind::Nobits,
            SHT_NOTE => SectionKind::Note,
            other => SectionKind::Other(other),
        };

        sections.push(Section {
            name,
            address: shdr.sh_addr,
            size: shdr.sh_size,
            flags,
            kind,
        });
    }
    sections.sort_by_key(|s| s.address);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn section_kind_wire_names() {
        assert_eq!(SectionKind::Progbits.wire_name(), "PROGBITS");
        assert_eq!(SectionKind::Nobits.wire_name(), "NOBITS");
    }

    #[test]
    fn has_flag_checks_membership() {
        let section = Section {
            name: ".text".into(),
            address: 0,
            size: 0,
            flags: vec![SectionFlag::Alloc, SectionFlag::Exec],
            kind: SectionKind::Progbits,
        };
        assert!(section.has_flag(SectionFlag::Exec));
        assert!(!section.has_flag(SectionFlag::Write));
    }
}
