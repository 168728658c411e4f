//! Cache key generation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::types::ApiTarget;

const COMPONENT_SEPARATOR: &str = "_";

/// Opaque cache key. Usually a hex digest derived from a request shape, but
/// callers may supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Lowercase hex SHA-256 of `input`.
pub(crate) fn hex_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Rebuild `value` with every object's keys in lexicographic order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize parameters with sorted keys so insertion order never leaks into the key.
fn sorted_json(parameters: &Map<String, Value>) -> String {
    let sorted: BTreeMap<&String, Value> = parameters
        .iter()
        .map(|(k, v)| (k, canonicalize(v)))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// Derive a cache key from the shape of a request.
///
/// Components are `method`, `base_url`, `path` and, when non-empty, the
/// parameters serialized with sorted keys. An absent parameter set is omitted
/// rather than replaced with a placeholder.
pub fn derive_key(
    method: &str,
    base_url: &str,
    path: &str,
    parameters: Option<&Map<String, Value>>,
) -> CacheKey {
    CacheKeyGenerator::new().generate(method, base_url, path, parameters)
}

#[derive(Debug, Clone)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Namespace every generated key, e.g. per signed-in user.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(
        &self,
        method: &str,
        base_url: &str,
        path: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> CacheKey {
        let mut components: Vec<String> =
            vec![method.to_string(), base_url.to_string(), path.to_string()];
        if let Some(params) = parameters.filter(|p| !p.is_empty()) {
            components.push(sorted_json(params));
        }
        if let Some(ref s) = self.salt {
            components.push(s.clone());
        }
        CacheKey::new(hex_digest(&components.join(COMPONENT_SEPARATOR)))
    }

    pub fn generate_for(&self, target: &dyn ApiTarget) -> CacheKey {
        let parameters = target.parameters();
        self.generate(
            target.method().as_str(),
            target.base_url().as_str(),
            &target.path(),
            parameters.as_ref(),
        )
    }
}

impl Default for CacheKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}
