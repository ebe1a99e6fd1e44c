//! # SOC API
//!
//! HTTP gateway for the AI-assisted SOC case-enrichment platform.
//!
//! Features:
//! - Axum-based web server
//! - Tower middleware (CORS, compression, timeouts, request ids, tracing)
//! - OpenTelemetry-ready observability
//! - Graceful shutdown

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod telemetry;

pub use error::{ApiError, ApiResult};
pub use server::{ServerConfig, SocApiServer};
pub use state::AppState;
