//! Population state and cancellation.
//!
//! - `GraphState`: where the graph is in the load/populate lifecycle
//! - `CancelFlag`: shared abort signal checked between fetches

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

// =============================================================================
// GraphState
// =============================================================================

/// Lifecycle of an [`AssetGraph`](super::AssetGraph).
///
/// ```text
/// Empty -> Loading -> Populating -> Populated
///                          \------> Incomplete (cancelled or failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphState {
    /// No assets yet.
    #[default]
    Empty,
    /// Roots loaded, discovered targets still queued.
    Loading,
    /// Following relations.
    Populating,
    /// Fixed point reached: no pending assets.
    Populated,
    /// Population stopped early. The graph stays queryable.
    Incomplete,
}

impl GraphState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::Populating => "populating",
            Self::Populated => "populated",
            Self::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CancelFlag
// =============================================================================

/// Cloneable abort signal for population and long-running transforms.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_state() {
        assert_eq!(GraphState::default(), GraphState::Empty);
        assert_eq!(GraphState::Incomplete.to_string(), "incomplete");
    }

    #[test]
    fn test_cancel_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let flag = CancelFlag::new();
        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        flag.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_set() {
        let flag = CancelFlag::new();
        flag.cancel();
        tokio::time::timeout(Duration::from_millis(100), flag.cancelled())
            .await
            .unwrap();
    }
}
