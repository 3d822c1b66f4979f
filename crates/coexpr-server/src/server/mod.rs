//! Server-side components of the co-expression service.
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - HTTP routes, request parsing and response streaming.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod config;
pub mod service;
pub mod telemetry;
