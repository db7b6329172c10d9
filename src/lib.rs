//! gemgate - OpenAI-compatible gateway for Gemini Business
//!
//! This library provides the core functionality for the gemgate proxy:
//! the protocol-translating gateway, the durable account pool, and the
//! credential rotation loop.

pub mod config;
pub mod error;
pub mod gateway;
pub mod rotation;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
