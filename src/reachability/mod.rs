//! 网络可达性：连通状态的来源与变化流。
//!
//! Reachability sources feed the dispatcher's state machine. The dispatcher
//! only reacts to transitions; a source may repeat a state, repeats are
//! ignored downstream.

mod probe;

pub use probe::ProbeReachability;

use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reachability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

impl Reachability {
    pub fn is_available(&self) -> bool {
        matches!(self, Reachability::Available)
    }
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Reachability::Unknown => "unknown",
            Reachability::Available => "available",
            Reachability::Unavailable => "unavailable",
        })
    }
}

/// Injected connectivity signal.
pub trait ReachabilitySource: Send + Sync {
    /// Best current knowledge, used to seed state at construction.
    fn current(&self) -> Reachability;

    /// Stream of subsequent observations. Ends when the source goes away.
    fn watch(&self) -> BoxStream<'static, Reachability>;
}

/// Source driven by hand, for tests and for hosts that already track
/// connectivity themselves (e.g. a platform network monitor callback).
#[derive(Clone)]
pub struct ManualReachability {
    tx: Arc<watch::Sender<Reachability>>,
}

impl ManualReachability {
    pub fn new(initial: Reachability) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: Reachability) {
        self.tx.send_replace(state);
    }
}

impl Default for ManualReachability {
    fn default() -> Self {
        Self::new(Reachability::Available)
    }
}

impl ReachabilitySource for ManualReachability {
    fn current(&self) -> Reachability {
        *self.tx.borrow()
    }

    fn watch(&self) -> BoxStream<'static, Reachability> {
        let rx = self.tx.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let state = *rx.borrow_and_update();
            Some((state, rx))
        }))
    }
}
