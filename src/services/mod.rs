pub mod http_server;
pub mod metrics;

pub use http_server::{create_router, HealthResponse, HealthStatus, HttpServer, ServerState};
pub use metrics::Metrics;
