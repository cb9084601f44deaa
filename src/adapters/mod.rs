//! # Platform Adapter Implementations
//!
//! Concrete `PlatformAdapter`s shipped with the core. Platform crawling
//! itself lives in an external sidecar; `http` forwards to it.

pub mod http;

pub use http::HttpPlatformAdapter;
