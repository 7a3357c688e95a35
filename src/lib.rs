pub mod cache;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod performance;
pub mod rate_limit;
pub mod routes;
pub mod services;

pub use cache::CacheManager;
pub use config::Config;
pub use errors::GatewayError;
pub use models::{AppState, SharedState};
pub use performance::PerformanceTracker;
pub use rate_limit::RateLimiter;
