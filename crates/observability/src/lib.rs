//! # switchboard-observability
//!
//! Observability-Crate fuer Switchboard:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/api/health`)
//! - Structured JSON Logging via tracing-subscriber
//! - Request-Timing Middleware

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod status;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, SwitchboardMetrics};
pub use middleware::{request_timing_layer, timing_middleware};
pub use status::{Kennzahlen, StatusQuelle};
