//! Plugin chain wrapped around every transport call.

mod base;
mod headers;
mod logger;

pub use base::{Plugin, PluginChain, PluginPriority};
pub use headers::{ClientInfo, HeaderPlugin, TokenSource};
pub use logger::LoggerPlugin;
