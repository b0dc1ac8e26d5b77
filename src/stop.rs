use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::SimpipeResult;

/// Cooperative cancellation token shared by every production loop.
///
/// The flag is monotonic for the lifetime of a run: it is only ever set,
/// never cleared. Signal handlers perform nothing beyond the atomic store.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Wire `SIGINT` and `SIGTERM` to this token.
    pub fn register_signals(&self) -> SimpipeResult<()> {
        use anyhow::Context as _;
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(sig, Arc::clone(&self.0))
                .with_context(|| format!("register stop handler for signal {sig}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_set_is_sticky() {
        let stop = StopToken::new();
        assert!(!stop.is_set());
        stop.set();
        stop.set();
        assert!(stop.is_set());
    }

    #[test]
    fn clones_share_state() {
        let stop = StopToken::new();
        let other = stop.clone();
        other.set();
        assert!(stop.is_set());
    }
}
