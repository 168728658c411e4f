//! Common request headers and bearer authentication.

use super::base::{Plugin, PluginPriority};
use crate::transport::PreparedRequest;
use crate::types::ApiTarget;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;

/// Identity of the calling application, sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub platform: String,
    pub os_version: String,
    pub app_version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            os_version: String::new(),
            app_version: String::new(),
        }
    }
}

impl ClientInfo {
    pub fn new(
        platform: impl Into<String>,
        os_version: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            os_version: os_version.into(),
            app_version: app_version.into(),
        }
    }
}

/// Supplies the current access token, if any.
pub struct TokenSource(Box<dyn Fn() -> Option<String> + Send + Sync>);

impl TokenSource {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    pub fn token(&self) -> Option<String> {
        (self.0)()
    }
}

/// Adds `Authorization`, `Content-Type`, `Platform`, `OS-Version` and
/// `App-Version` headers. Headers set by the target itself are kept.
pub struct HeaderPlugin {
    client: ClientInfo,
    token: Arc<ArcSwapOption<TokenSource>>,
}

impl HeaderPlugin {
    pub fn new(client: ClientInfo) -> Self {
        Self {
            client,
            token: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Shared slot the token supplier lives in; swapping it affects every
    /// later request.
    pub fn token_slot(&self) -> Arc<ArcSwapOption<TokenSource>> {
        self.token.clone()
    }

    pub fn with_token_source(self, source: TokenSource) -> Self {
        self.token.store(Some(Arc::new(source)));
        self
    }

    fn set_default(request: &mut PreparedRequest, name: &str, value: &str) {
        if request.header(name).is_none() {
            request.set_header(name, value);
        }
    }
}

#[async_trait]
impl Plugin for HeaderPlugin {
    fn name(&self) -> &str {
        "headers"
    }

    fn priority(&self) -> PluginPriority {
        PluginPriority::High
    }

    async fn prepare(&self, request: &mut PreparedRequest, _target: &dyn ApiTarget) {
        let token = self.token.load().as_ref().and_then(|s| s.token());
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request.set_header("Authorization", format!("Bearer {}", token));
        }
        Self::set_default(request, "Content-Type", "application/json");
        Self::set_default(request, "Platform", &self.client.platform);
        Self::set_default(request, "OS-Version", &self.client.os_version);
        Self::set_default(request, "App-Version", &self.client.app_version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Endpoint;
    use url::Url;

    fn target() -> Endpoint {
        Endpoint::get(Url::parse("https://api.example.com").unwrap(), "/user/1")
    }

    #[tokio::test]
    async fn test_static_headers_without_token() {
        let plugin = HeaderPlugin::new(ClientInfo::new("iOS", "17.4", "2.3.0"));
        let t = target();
        let mut req = PreparedRequest::from_target(&t);
        plugin.prepare(&mut req, &t).await;

        assert_eq!(req.header("Authorization"), None);
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Platform"), Some("iOS"));
        assert_eq!(req.header("OS-Version"), Some("17.4"));
        assert_eq!(req.header("App-Version"), Some("2.3.0"));
    }

    #[tokio::test]
    async fn test_token_is_swappable() {
        let plugin = HeaderPlugin::new(ClientInfo::default())
            .with_token_source(TokenSource::new(|| Some("first".into())));
        let t = target();

        let mut req = PreparedRequest::from_target(&t);
        plugin.prepare(&mut req, &t).await;
        assert_eq!(req.header("Authorization"), Some("Bearer first"));

        plugin
            .token_slot()
            .store(Some(Arc::new(TokenSource::new(|| Some("second".into())))));
        let mut req = PreparedRequest::from_target(&t);
        plugin.prepare(&mut req, &t).await;
        assert_eq!(req.header("Authorization"), Some("Bearer second"));

        plugin.token_slot().store(Some(Arc::new(TokenSource::new(|| None))));
        let mut req = PreparedRequest::from_target(&t);
        plugin.prepare(&mut req, &t).await;
        assert_eq!(req.header("Authorization"), None);
    }

    #[tokio::test]
    async fn test_target_headers_take_precedence() {
        let plugin = HeaderPlugin::new(ClientInfo::default());
        let t = target().header("Content-Type", "text/plain");
        let mut req = PreparedRequest::from_target(&t);
        plugin.prepare(&mut req, &t).await;
        assert_eq!(req.header("Content-Type"), Some("text/plain"));
    }
}
