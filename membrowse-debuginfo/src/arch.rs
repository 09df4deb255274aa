//! Classifies an ELF's target architecture from its header's `e_machine` field.

use goblin::elf::header;
use membrowse_common::Arch;

/// Inspects `e_machine` and maps it to the small closed [`Arch`] enumeration the rest of the
/// core (and the JSON wire contract) works with.
pub fn detect(e_machine: u16) -> Arch {
    match e_machine {
        header::EM_ARM => Arch::Arm,
        header::EM_XTENSA => Arch::Xtensa,
        header::EM_RISCV => Arch::RiscV,
        header::EM_386 => Arch::X86,
        header::EM_X86_64 => Arch::X86_64,
        _ => Arch::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_machines() {
        assert_eq!(detect(header::EM_ARM), Arch::Arm);
        assert_eq!(detect(header::EM_XTENSA), Arch::Xtensa);
        assert_eq!(detect(header::EM_RISCV), Arch::RiscV);
        assert_eq!(detect(header::EM_386), Arch::X86);
        assert_eq!(detect(header::EM_X86_64), Arch::X86_64);
    }

    #[test]
    fn unknown_machine_falls_back() {
        assert_eq!(detect(0xffff), Arch::Unknown);
    }
}
