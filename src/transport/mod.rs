//! 传输层：对外部 HTTP 执行能力的抽象。
//!
//! Transport layer. The dispatcher never speaks HTTP itself; it prepares a
//! [`PreparedRequest`] and hands it to an injected [`Transport`].

pub mod http;

pub use http::{HttpTransport, TransportConfig};

use crate::types::{ApiTarget, HttpMethod, ParameterEncoding};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A fully resolved outgoing request, after plugins have run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// Correlation id for logs.
    pub request_id: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PreparedRequest {
    pub fn from_target(target: &dyn ApiTarget) -> Self {
        let mut query = Vec::new();
        let mut body = None;
        if let Some(params) = target.parameters().filter(|p| !p.is_empty()) {
            match target.encoding() {
                ParameterEncoding::Query => {
                    query = params
                        .iter()
                        .map(|(k, v)| (k.clone(), query_value(v)))
                        .collect();
                }
                ParameterEncoding::JsonBody => body = Some(Value::Object(params)),
            }
        }
        Self {
            request_id: Uuid::new_v4().to_string(),
            method: target.method(),
            url: target.url(),
            headers: target.headers(),
            query,
            body,
        }
    }

    /// Set a header, replacing any value already present.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// What came back over the wire, before any status or body interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status_code: u16,
    pub body: Bytes,
    pub url: String,
}

impl RawResponse {
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status_code,
            body: body.into(),
            url: String::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Executes prepared requests. Implemented by [`HttpTransport`]; tests
/// substitute their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Not connected: {0}")]
    Connectivity(String),

    #[error("Transport error: {0}")]
    Other(String),
}
