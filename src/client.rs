//! Network dispatcher: reachability-aware, cache-then-network calls.
//!
//! Keep the public surface small and predictable. Implementation details are
//! split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod dispatch;
pub(crate) mod error_classification;
pub mod options;
pub mod signals;

pub use builder::{NetworkConfig, NetworkManagerBuilder};
pub use self::core::NetworkManager;
pub use options::CacheOptions;
pub use signals::DispatcherSnapshot;
