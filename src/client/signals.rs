use crate::cache::CacheStats;
use crate::reachability::Reachability;

/// Point-in-time facts about a [`NetworkManager`](crate::NetworkManager).
///
/// Facts only. Callers decide what to do with them (show an offline banner,
/// log, export).
#[derive(Debug, Clone, Default)]
pub struct DispatcherSnapshot {
    pub reachability: Reachability,
    pub pending: usize,
    pub max_pending: usize,
    pub cache: CacheStats,
}

impl DispatcherSnapshot {
    pub fn is_offline(&self) -> bool {
        matches!(self.reachability, Reachability::Unavailable)
    }
}
