//! Filtering proxy servers.

pub mod filter;
pub mod http;
pub mod socks5;

pub use filter::{DomainFilter, FilterDecision};
pub use http::{HttpProxy, BLOCKED_MESSAGE};
pub use socks5::Socks5Proxy;
