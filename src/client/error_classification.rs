//! Error classification logic
//!
//! Folds transport failures, HTTP status codes, decode failures and envelope
//! business codes into the closed [`Error`] taxonomy.

use crate::transport::{RawResponse, TransportError};
use crate::types::ResponseEnvelope;
use crate::{Error, ErrorContext, Result};
use serde::de::DeserializeOwned;

pub(crate) fn classify_transport_error(err: TransportError, url: &str) -> Error {
    match err {
        TransportError::Timeout => Error::Timeout,
        TransportError::Connectivity(_) => Error::NetworkUnavailable,
        TransportError::Http(e) if e.is_timeout() => Error::Timeout,
        TransportError::Http(e) if e.is_connect() => Error::NetworkUnavailable,
        TransportError::Http(e) => Error::unknown_with_context(
            "HTTP request failed",
            ErrorContext::new()
                .with_field_path(url)
                .with_details(e.to_string())
                .with_source("transport"),
        ),
        TransportError::Other(msg) => Error::unknown_with_context(
            "transport failed",
            ErrorContext::new()
                .with_field_path(url)
                .with_details(msg)
                .with_source("transport"),
        ),
    }
}

/// Only 2xx passes; anything else is a `ServerError` carrying the canonical
/// reason phrase.
pub(crate) fn check_status(raw: &RawResponse) -> Result<()> {
    if raw.is_success() {
        return Ok(());
    }
    let message = reqwest::StatusCode::from_u16(raw.status_code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string();
    Err(Error::ServerError {
        status: raw.status_code,
        message,
    })
}

pub(crate) fn decode_body<T: DeserializeOwned>(raw: &RawResponse) -> Result<T> {
    check_status(raw)?;
    serde_json::from_slice(&raw.body).map_err(Error::decode)
}

pub(crate) fn decode_envelope<T: DeserializeOwned>(
    raw: &RawResponse,
) -> Result<ResponseEnvelope<T>> {
    let envelope: ResponseEnvelope<T> = decode_body(raw)?;
    if !envelope.is_success() {
        return Err(Error::BusinessError {
            code: envelope.code,
            message: envelope.message,
        });
    }
    Ok(envelope)
}
