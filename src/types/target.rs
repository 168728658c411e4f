//! Request descriptors.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where request parameters travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterEncoding {
    /// URL query string.
    Query,
    /// JSON request body.
    JsonBody,
}

/// Description of a single HTTP endpoint call.
///
/// Implement this per endpoint enum; every method is cheap and side-effect
/// free so it can be called repeatedly (key derivation, request preparation,
/// logging).
pub trait ApiTarget: Send + Sync {
    fn base_url(&self) -> Url;
    fn path(&self) -> String;
    fn method(&self) -> HttpMethod;

    fn parameters(&self) -> Option<Map<String, Value>> {
        None
    }

    fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Query string for reads, JSON body for writes.
    fn encoding(&self) -> ParameterEncoding {
        match self.method() {
            HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete => ParameterEncoding::Query,
            _ => ParameterEncoding::JsonBody,
        }
    }

    /// Resolve from cache only; never fall through to the network.
    fn cache_only(&self) -> bool {
        false
    }

    /// Full request URL: base URL joined with the path.
    fn url(&self) -> String {
        let base = self.base_url();
        let path = self.path();
        format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Marks any target as cache-only.
#[derive(Debug, Clone)]
pub struct CacheOnly<T>(pub T);

impl<T: ApiTarget> ApiTarget for CacheOnly<T> {
    fn base_url(&self) -> Url {
        self.0.base_url()
    }
    fn path(&self) -> String {
        self.0.path()
    }
    fn method(&self) -> HttpMethod {
        self.0.method()
    }
    fn parameters(&self) -> Option<Map<String, Value>> {
        self.0.parameters()
    }
    fn headers(&self) -> BTreeMap<String, String> {
        self.0.headers()
    }
    fn encoding(&self) -> ParameterEncoding {
        self.0.encoding()
    }
    fn cache_only(&self) -> bool {
        true
    }
}

/// Ad-hoc endpoint for calls that do not warrant their own enum.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: Url,
    path: String,
    method: HttpMethod,
    parameters: Option<Map<String, Value>>,
    headers: BTreeMap<String, String>,
    encoding: Option<ParameterEncoding>,
}

impl Endpoint {
    pub fn new(method: HttpMethod, base_url: Url, path: impl Into<String>) -> Self {
        Self {
            base_url,
            path: path.into(),
            method,
            parameters: None,
            headers: BTreeMap::new(),
            encoding: None,
        }
    }

    pub fn get(base_url: Url, path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, base_url, path)
    }

    pub fn post(base_url: Url, path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, base_url, path)
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }
}

impl ApiTarget for Endpoint {
    fn base_url(&self) -> Url {
        self.base_url.clone()
    }
    fn path(&self) -> String {
        self.path.clone()
    }
    fn method(&self) -> HttpMethod {
        self.method
    }
    fn parameters(&self) -> Option<Map<String, Value>> {
        self.parameters.clone()
    }
    fn headers(&self) -> BTreeMap<String, String> {
        self.headers.clone()
    }
    fn encoding(&self) -> ParameterEncoding {
        self.encoding.unwrap_or(match self.method {
            HttpMethod::Get | HttpMethod::Head | HttpMethod::Delete => ParameterEncoding::Query,
            _ => ParameterEncoding::JsonBody,
        })
    }
}
