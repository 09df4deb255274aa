//! Parsing and evaluation of GNU linker scripts, reduced to the single question the rest of
//! the analysis core needs answered: what named memory regions exist, and where.
//!
//! The crate is organized the way the grammar is consumed: [`lexer`] tokenizes a script,
//! [`parser`] turns tokens into an [`ast::Script`], [`eval`] walks expressions against a
//! running [`eval::Env`], and [`region`] drives the two-pass evaluation described for the
//! script-execution state machine, producing the canonical region list.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod region;

use std::collections::BTreeMap;

use membrowse_common::Arch;

pub use ast::Script;
pub use error::{LinkerEvalError, LinkerParseError, LinkerWarning, LinkerWarningKind, SourceLoc};
pub use region::{default_regions, MemoryRegion, RegionKind, SectionGeometry};

#[derive(Debug, thiserror::Error)]
pub enum LinkerError {
    #[error(transparent)]
    Parse(#[from] LinkerParseError),
    #[error(transparent)]
    Eval(#[from] LinkerEvalError),
}

/// One linker script file on disk, identified by the path it was read from.
pub struct ScriptSource {
    pub path: String,
    pub contents: String,
}

/// Parses and resolves every supplied linker script (concatenated in the order given, the
/// same order GNU ld applies command-line `-T` scripts in) into a canonical region list.
///
/// Returns an empty, non-`auto` region list (not the default fallback) when `sources` is
/// empty; callers that want the §4.6 default-region behavior should call
/// [`default_regions`] themselves when `sources.is_empty()`.
pub fn analyze_scripts(
    sources: &[ScriptSource],
    arch: Arch,
    overrides: BTreeMap<String, i64>,
) -> Result<(Vec<MemoryRegion>, Vec<LinkerWarning>), LinkerError> {
    let mut scripts = Vec::with_capacity(sources.len());
    for source in sources {
        scripts.push(parser::parse_script(&source.path, &source.contents)?);
    }
    let (regions, warnings) = region::resolve_regions(&scripts, arch, overrides)?;
    Ok((regions, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_two_file_script() {
        let sources = vec![
            ScriptSource {
                path: "common.ld".to_string(),
                contents: "MEMORY\n{\n  FLASH (rx) : ORIGIN = 0x08000000, LENGTH = 512K\n}\n".to_string(),
            },
            ScriptSource {
                path: "app.ld".to_string(),
                contents: "MEMORY\n{\n  RAM (rwx) : ORIGIN = 0x20000000, LENGTH = 128K\n}\n".to_string(),
            },
        ];
        let (regions, warnings) = analyze_scripts(&sources, Arch::Arm, BTreeMap::new()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(regions.len(), 2);
    }

    #[test]
    fn propagates_parse_errors() {
        let sources = vec![ScriptSource {
            path: "bad.ld".to_string(),
            contents: "MEMORY { FLASH (rx :".to_string(),
        }];
        let err = analyze_scripts(&sources, Arch::Unknown, BTreeMap::new()).unwrap_err();
        assert!(matches!(err, LinkerError::Parse(_)));
    }
}
