//! HTTP gateway module.
//!
//! This module provides the OpenAI-compatible HTTP API that accepts chat
//! requests, translates them to the vendor's wire format, and translates
//! the replies back -- including reassembly of streamed responses.

mod handlers;
mod server;
mod stream;
pub mod types;
mod upstream;

pub use server::{create_router, run_server, AppState, RequestId};
pub use upstream::UpstreamClient;
