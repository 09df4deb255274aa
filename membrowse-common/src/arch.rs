//! CPU architecture detection and architecture-default variable bindings.
//!
//! Mirrors the `Arch`/`CpuFamily` split used elsewhere in this codebase's ELF tooling:
//! a small, closed enumeration that the ELF header is classified into, plus a table of
//! defaults consulted by the linker expression evaluator when a script references a
//! vendor-specific size symbol it never defines itself (e.g. ESP-IDF's
//! `__flash_size__, family of constants).

use std::fmt;

/// CPU architecture of the analyzed ELF, as reported in the JSON wire contract.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub enum Arch {
    Arm,
    Xtensa,
    RiscV,
    X86,
    X86_64,
    #[default]
    Unknown,
}

impl Arch {
    /// The machine classes recognized for each architecture, as found in the ELF header's
    /// `e_machine` field. Populated by `membrowse-debuginfo`'s ArchDetector; kept here so
    /// that the mapping from ELF constants to `Arch` lives next to the type it produces.
    pub fn wire_name(self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Xtensa => "xtensa",
            Arch::RiscV => "riscv",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Unknown => "other",
        }
    }

    /// Returns the architecture-specific default bindings consulted by the linker
    /// expression evaluator's symbol lookup, tier 2 of the order specified in §4.2:
    /// after the evaluator's own running environment, before CLI `--def` overrides.
    ///
    /// These are deliberately few and well-known: vendor SDKs that rely on them
    /// (ESP-IDF, in particular) usually define them in a `sdkconfig`-derived linker
    /// fragment, but some minimal scripts omit the fragment and expect the toolchain
    /// to supply a sane default.
    pub fn default_bindings(self) -> &'static [(&'static str, i64)] {
        match self {
            Arch::Xtensa => &[
                ("__flash_size__", 4 * 1024 * 1024),
                ("__rtc_iram_seg_len__", 8 * 1024),
                ("__rtc_slow_seg_len__", 8 * 1024),
            ],
            Arch::Arm => &[("__flash_size__", 1024 * 1024)],
            _ => &[],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl serde::Serialize for Arch {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_contract() {
        assert_eq!(Arch::Arm.wire_name(), "arm");
        assert_eq!(Arch::Xtensa.wire_name(), "xtensa");
        assert_eq!(Arch::RiscV.wire_name(), "riscv");
        assert_eq!(Arch::X86.wire_name(), "x86");
        assert_eq!(Arch::X86_64.wire_name(), "x86_64");
        assert_eq!(Arch::Unknown.wire_name(), "other");
    }

    #[test]
    fn xtensa_has_flash_size_default() {
        let bindings = Arch::Xtensa.default_bindings();
        assert!(bindings.iter().any(|(name, _)| *name == "__flash_size__"));
    }

    #[test]
    fn x86_64_has_no_defaults() {
        assert!(Arch::X86_64.default_bindings().is_empty());
    }
}
