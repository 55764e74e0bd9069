//! # wallarm-core
//!
//! Core types and utilities for talking to the Wallarm Cloud API.
//!
//! This crate provides the error taxonomy, configuration, cancellation and the
//! retrying HTTP transport shared by the Wallarm API clients.
//!
//! ## Modules
//!
//! - [`error`] - Error types and response classification
//! - [`types`] - Resource kinds and request payloads
//! - [`config`] - Configuration structures for API clients
//! - [`cancel`] - Cancellation tokens with optional deadlines
//! - [`client`] - HTTP transport and retry policy

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use client::{ApiClient, ClientOptions, RetryPolicy};
pub use config::ApiClientConfig;
pub use error::{Error, Result};
pub use types::{Payload, ResourceKind};
