//! Request/response logging.

use super::base::{Plugin, PluginPriority};
use crate::transport::{PreparedRequest, RawResponse, TransportError};
use async_trait::async_trait;
use tracing::{debug, warn};

const MAX_LOGGED_BODY: usize = 2048;

/// Logs every request and its outcome through `tracing`.
///
/// Enabled by default in debug builds only. `Authorization` is redacted.
pub struct LoggerPlugin {
    enabled: bool,
}

impl LoggerPlugin {
    pub fn new() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn headers_for_log(request: &PreparedRequest) -> String {
        request
            .headers
            .iter()
            .map(|(k, v)| {
                if k.eq_ignore_ascii_case("authorization") {
                    format!("{}: <redacted>", k)
                } else {
                    format!("{}: {}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for LoggerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_LOGGED_BODY {
        return text;
    }
    let mut end = MAX_LOGGED_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl Plugin for LoggerPlugin {
    fn name(&self) -> &str {
        "logger"
    }

    // Runs after header injection so the logged request is what goes out.
    fn priority(&self) -> PluginPriority {
        PluginPriority::Lowest
    }

    async fn will_send(&self, request: &PreparedRequest) {
        if !self.enabled {
            return;
        }
        let body = request
            .body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        debug!(
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            query = ?request.query,
            headers = %Self::headers_for_log(request),
            body = %truncate(&body),
            "sending request"
        );
    }

    async fn did_receive(
        &self,
        request: &PreparedRequest,
        result: &Result<RawResponse, TransportError>,
    ) {
        if !self.enabled {
            return;
        }
        match result {
            Ok(resp) => {
                let body = String::from_utf8_lossy(&resp.body);
                debug!(
                    request_id = %request.request_id,
                    url = %request.url,
                    status = resp.status_code,
                    body = %truncate(&body),
                    "response received"
                );
            }
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    url = %request.url,
                    error = %e,
                    "request failed"
                );
            }
        }
    }
}
