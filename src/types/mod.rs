//! 类型模块：请求描述与统一响应包装。
//!
//! # Types Module
//!
//! Request descriptors consumed by the dispatcher and the response envelopes
//! it decodes.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ApiTarget`] | Capability set describing one endpoint call |
//! | [`Endpoint`] | Ad-hoc [`ApiTarget`] built field by field |
//! | [`CacheOnly`] | Wrapper flagging a target as cache-only |
//! | [`ResponseEnvelope`] | `{code, message, data}` business wrapper |
//! | [`PageEnvelope`] | Paginated listing with page math |
//!
//! ## Example
//!
//! ```rust
//! use netcache::types::{ApiTarget, HttpMethod};
//! use url::Url;
//!
//! enum Shop {
//!     Banners,
//!     Product { id: u64 },
//! }
//!
//! impl ApiTarget for Shop {
//!     fn base_url(&self) -> Url {
//!         Url::parse("https://api.example.com").expect("static url")
//!     }
//!     fn path(&self) -> String {
//!         match self {
//!             Shop::Banners => "/banners".into(),
//!             Shop::Product { id } => format!("/products/{}", id),
//!         }
//!     }
//!     fn method(&self) -> HttpMethod {
//!         HttpMethod::Get
//!     }
//! }
//!
//! assert_eq!(Shop::Product { id: 7 }.url(), "https://api.example.com/products/7");
//! ```

pub mod response;
pub mod target;

pub use response::{PageEnvelope, ResponseEnvelope};
pub use target::{ApiTarget, CacheOnly, Endpoint, HttpMethod, ParameterEncoding};
