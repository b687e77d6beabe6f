//! Relay - multi-tenant inference gateway
//!
//! Sits between tenant-facing features (chat, embeddings, agent answers,
//! long-form generation) and a single LLM inference backend. For every call
//! it resolves provider and model identifiers, picks the tenant's encrypted
//! provider key (or a process-wide fallback), dispatches to the backend,
//! normalizes the response and meters token usage per tenant and day.

pub mod agents;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod generation;
pub mod logging;
pub mod metering;
pub mod quality;
pub mod resolver;
pub mod store;
pub mod vault;

pub use app::{Gateway, GatewayBuilder, InitError};
pub use dispatch::{Dispatcher, GatewayError};
