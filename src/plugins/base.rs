//! Base plugin types.

use crate::transport::{PreparedRequest, RawResponse, Transport, TransportError};
use crate::types::ApiTarget;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PluginPriority {
    Highest = 0,
    High = 25,
    #[default]
    Normal = 50,
    Low = 75,
    Lowest = 100,
}

/// Hooks around every transport call.
///
/// `prepare` may rewrite the request; the other hooks only observe.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> PluginPriority {
        PluginPriority::Normal
    }
    async fn prepare(&self, _request: &mut PreparedRequest, _target: &dyn ApiTarget) {}
    async fn will_send(&self, _request: &PreparedRequest) {}
    async fn did_receive(
        &self,
        _request: &PreparedRequest,
        _result: &Result<RawResponse, TransportError>,
    ) {
    }
}

/// Plugins run in priority order, ties in insertion order.
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.add(Arc::new(plugin));
        self
    }

    pub fn add(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
        // stable sort keeps insertion order within a priority
        self.plugins.sort_by_key(|p| p.priority());
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    /// Prepare the request for `target`, run it through `transport`, and let
    /// every plugin observe the outcome.
    pub async fn execute(
        &self,
        target: &dyn ApiTarget,
        transport: &dyn Transport,
    ) -> Result<RawResponse, TransportError> {
        let mut request = PreparedRequest::from_target(target);
        for p in &self.plugins {
            p.prepare(&mut request, target).await;
        }
        for p in &self.plugins {
            p.will_send(&request).await;
        }

        let result = transport.execute(&request).await;

        for p in &self.plugins {
            p.did_receive(&request, &result).await;
        }
        result
    }
}
