use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Request URL or configuration key that caused the error (e.g., "https://api.example.com/banners", "cache.directory")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., the underlying transport message)
    pub details: Option<String>,
    /// Source of the error (e.g., "transport", "builder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Boxed cause carried by decode errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error taxonomy for dispatched requests.
///
/// This is a closed set: every transport, status, decode, and envelope failure
/// is folded into one of these variants before it reaches a consumer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network unavailable, check the connection")]
    NetworkUnavailable,

    #[error("Request timed out, try again later")]
    Timeout,

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    DecodeError(#[source] BoxError),

    #[error("{message}")]
    BusinessError { code: i64, message: String },

    #[error("Unknown error: {message}{}", format_context(.context))]
    Unknown {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Wrap any error as a decode failure.
    pub fn decode(err: impl Into<BoxError>) -> Self {
        Error::DecodeError(err.into())
    }

    /// Create a new unknown error with structured context
    pub fn unknown_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Unknown {
            message: msg.into(),
            context,
        }
    }

    /// Numeric code for display and analytics.
    ///
    /// Server and business errors report their own code; the rest use fixed
    /// negative values.
    pub fn code(&self) -> i64 {
        match self {
            Error::NetworkUnavailable => -1001,
            Error::Timeout => -1002,
            Error::ServerError { status, .. } => i64::from(*status),
            Error::DecodeError(_) => -1003,
            Error::Unknown { .. } => -1004,
            Error::BusinessError { code, .. } => *code,
        }
    }

    pub fn is_business(&self) -> bool {
        matches!(self, Error::BusinessError { .. })
    }

    /// Message suitable for end users.
    ///
    /// Business messages are server-authored and shown verbatim; everything
    /// else collapses to generic wording.
    pub fn user_message(&self) -> String {
        match self {
            Error::BusinessError { message, .. } => message.clone(),
            Error::NetworkUnavailable => "Waiting for network connection".to_string(),
            Error::Timeout => "Request timed out, try again later".to_string(),
            Error::ServerError { .. } | Error::DecodeError(_) | Error::Unknown { .. } => {
                "Something went wrong, try again later".to_string()
            }
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Unknown { context, .. } => Some(context),
            _ => None,
        }
    }
}

/// Failures inside the cache layer.
///
/// These never reach consumers: the cache manager logs them and treats the
/// operation as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
