//! Cooperative cancellation, checked at compilation-unit boundaries and between pipeline
//! stages per §5's resource model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use membrowse_debuginfo::dwarf::CancelCheck;

/// A cheaply cloneable handle a caller can flip from another thread to abort an in-flight
/// `analyze()` call. Checking is advisory: the analysis only observes it at well-defined
/// boundaries, never mid-expression-evaluation or mid-DIE.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl CancelCheck for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
