//! The unified error taxonomy surfaced at the `analyze()` boundary (§7), with the exit-code
//! mapping the CLI uses directly.

use membrowse_debuginfo::{ElfError, ScanError};
use membrowse_linker::{LinkerEvalError, LinkerParseError};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to read ELF file: {0}")]
    ElfFormat(#[from] ElfError),

    #[error("failed to read input file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    LinkerParse(#[from] LinkerParseError),

    #[error(transparent)]
    LinkerEval(#[from] LinkerEvalError),

    #[error("analysis was cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// The process exit code the CLI surface (§6.3) maps this error to.
    pub fn exit_code(&self) -> i32 {
        match self {
            AnalysisError::ElfFormat(_) => 3,
            AnalysisError::Io { .. } => 3,
            AnalysisError::LinkerParse(_) | AnalysisError::LinkerEval(_) => 4,
            AnalysisError::Cancelled => 130,
        }
    }
}

impl From<ScanError> for AnalysisError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Elf(e) => AnalysisError::ElfFormat(e),
            ScanError::Cancelled => AnalysisError::Cancelled,
        }
    }
}

impl From<membrowse_linker::LinkerError> for AnalysisError {
    fn from(err: membrowse_linker::LinkerError) -> Self {
        match err {
            membrowse_linker::LinkerError::Parse(e) => AnalysisError::LinkerParse(e),
            membrowse_linker::LinkerError::Eval(e) => AnalysisError::LinkerEval(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_maps_to_130() {
        assert_eq!(AnalysisError::Cancelled.exit_code(), 130);
    }
}
