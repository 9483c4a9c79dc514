//! Cancellation

use crate::NetError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for an in-flight request. Clones observe the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// `Err(Aborted)` once aborted
    pub fn check(&self) -> Result<(), NetError> {
        if self.is_aborted() { Err(NetError::Aborted) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_is_shared() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        assert!(signal.check().is_ok());
        clone.abort();
        assert!(signal.is_aborted());
        assert!(matches!(signal.check(), Err(NetError::Aborted)));
    }
}
