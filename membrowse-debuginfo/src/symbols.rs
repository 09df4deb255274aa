//! Enumerates ELF symbol tables, filtering down to symbols that actually denote a piece of
//! the binary (function, data object, or the few metadata kinds worth keeping for
//! reference) rather than undefined external references.

use goblin::elf::sym::{STB_GLOBAL, STB_WEAK, STT_FILE, STT_FUNC, STT_OBJECT, STT_SECTION, STT_TLS};
use goblin::elf::{Elf, SectionHeader};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    Func,
    Object,
    Tls,
    Section,
    File,
    Other,
}

impl SymbolKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            SymbolKind::Func => "FUNC",
            SymbolKind::Object => "OBJECT",
            SymbolKind::Tls => "TLS",
            SymbolKind::Section => "SECTION",
            SymbolKind::File => "FILE",
            SymbolKind::Other => "OTHER",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Binding {
    Local,
    Global,
    Weak,
}

impl Binding {
    pub fn wire_name(self) -> &'static str {
        match self {
            Binding::Local => "LOCAL",
            Binding::Global => "GLOBAL",
            Binding::Weak => "WEAK",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub binding: Binding,
    pub section_name: Option<String>,
}

fn kind_from_st_type(st_type: u8) -> Option<SymbolKind> {
    match st_type {
        STT_FUNC => Some(SymbolKind::Func),
        STT_OBJECT => Some(SymbolKind::Object),
        STT_TLS => Some(SymbolKind::Tls),
        STT_SECTION => Some(SymbolKind::Section),
        STT_FILE => Some(SymbolKind::File),
        _ => None,
    }
}

fn binding_from_st_bind(st_bind: u8) -> Binding {
    match st_bind {
        STB_GLOBAL => Binding::Global,
        STB_WEAK => Binding::Weak,
        _ => Binding::Local,
    }
}

fn section_name<'a>(elf: &'a Elf<'_>, shdr: &'a SectionHeader) -> Option<String> {
    elf.shdr_strtab.get_at(shdr.sh_name).map(|s| s.to_string())
}

/// Scans both `.symtab` (preferred) and, if empty, `.dynsym`, keeping symbols bound to a
/// real section (`st_shndx` pointing at an existing, non-absolute section index) whose type
/// is one this crate's data model retains (§3).
pub fn scan_symbols(elf: &Elf<'_>) -> Vec<Symbol> {
    let table: &[goblin::elf::Sym] = if !elf.syms.is_empty() {
        &elf.syms
    } else {
        &elf.dynsyms
    };

    let mut out = Vec::new();
    for sym in table.iter() {
        if sym.st_shndx == 0 {
            continue; // SHN_UNDEF: external reference, not defined in this binary.
        }
        let Some(kind) = kind_from_st_type(sym.st_type()) else {
            continue;
        };
        let name = elf
            .strtab
            .get_at(sym.st_name)
            .unwrap_or("")
            .to_string();
        if name.is_empty() && kind != SymbolKind::Section {
            continue;
        }

        let section_name = elf
            .section_headers
            .get(sym.st_shndx)
            .and_then(|shdr| section_name(elf, shdr));

        out.push(Symbol {
            name,
            address: sym.st_value,
            size: sym.st_size,
            kind,
            binding: binding_from_st_bind(sym.st_bind()),
            section_name,
        });
    }

    out.sort_by_key(|s| (s.address, s.name.clone()));
    out
}

#[cfg(feature = "demangle")]
pub fn demangle(name: &str) -> Option<String> {
    if let Ok(sym) = rustc_demangle::try_demangle(name) {
        return Some(sym.to_string());
    }
    if let Ok(sym) = cpp_demangle::Symbol::new(name) {
        if let Ok(s) = sym.demangle(&cpp_demangle::DemangleOptions::default()) {
            return Some(s);
        }
    }
    None
}

#[cfg(not(feature = "demangle"))]
pub fn demangle(_name: &str) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(SymbolKind::Func.wire_name(), "FUNC");
        assert_eq!(SymbolKind::Object.wire_name(), "OBJECT");
    }

    #[test]
    fn binding_wire_names() {
        assert_eq!(Binding::Local.wire_name(), "LOCAL");
        assert_eq!(Binding::Global.wire_name(), "GLOBAL");
        assert_eq!(Binding::Weak.wire_name(), "WEAK");
    }

    #[cfg(not(feature = "demangle"))]
    #[test]
    fn demangle_is_noop_without_feature() {
        assert_eq!(demangle("_ZN3foo3barEv"), None);
    }
}
