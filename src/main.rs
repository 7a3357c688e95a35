use attendance_gateway::{routes::routes, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "attendance_gateway=info";

/// `RUST_LOG` when set and valid, else the crate default.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()),
        )
        .init();

    let config = Config::load();
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!(
        environment = %config.environment,
        cache_max_entries = config.cache.max_entries,
        check_in_limit = config.rate_limit.check_in.max_requests,
        check_out_limit = config.rate_limit.check_out.max_requests,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config));

    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown_signal())?;

    info!("Attendance gateway running on http://{}", bound);
    server.await;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::log_filter;

    #[test]
    fn test_rust_log_overrides_default_level() {
        assert_eq!(log_filter(None).to_string(), "attendance_gateway=info");
        assert_eq!(
            log_filter(Some("attendance_gateway=debug")).to_string(),
            "attendance_gateway=debug"
        );
    }
}
