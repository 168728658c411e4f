use super::{Reachability, ReachabilitySource};
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Polls a TCP endpoint and reports `Available` while a connection can be
/// opened within `timeout`.
#[derive(Clone)]
pub struct ProbeReachability {
    target: String,
    interval: Duration,
    timeout: Duration,
    last: Arc<Mutex<Reachability>>,
}

impl ProbeReachability {
    /// `target` is a `host:port` pair.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            last: Arc::new(Mutex::new(Reachability::Unknown)),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One connection attempt.
    pub async fn probe(&self) -> Reachability {
        let state = match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await
        {
            Ok(Ok(_)) => Reachability::Available,
            Ok(Err(e)) => {
                debug!(target_addr = %self.target, error = %e, "reachability probe failed");
                Reachability::Unavailable
            }
            Err(_) => Reachability::Unavailable,
        };
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = state;
        state
    }
}

impl ReachabilitySource for ProbeReachability {
    fn current(&self) -> Reachability {
        *self.last.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn watch(&self) -> BoxStream<'static, Reachability> {
        let probe = self.clone();
        Box::pin(futures::stream::unfold(
            (probe, true),
            |(probe, first)| async move {
                if !first {
                    tokio::time::sleep(probe.interval).await;
                }
                let state = probe.probe().await;
                Some((state, (probe, false)))
            },
        ))
    }
}
