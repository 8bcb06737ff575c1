//! Adapters implementing the domain ports.

#[cfg(feature = "http-backend")]
pub mod http;
pub mod in_memory;
pub mod sandbox;
