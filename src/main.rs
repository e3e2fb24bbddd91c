use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reqlimit::config::ReqlimitConfig;
use reqlimit::middleware::RateLimitLayer;
use reqlimit::ratelimit::spawn_sweeper;

/// Demo server answering "success" behind the request limiter.
#[derive(Parser, Debug)]
#[command(name = "reqlimit", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides `server.bind_addr`
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Requests allowed per client per window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Key clients on X-Real-Ip / X-Forwarded-For (trusted proxy only)
    #[arg(long)]
    trust_proxy_headers: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting reqlimit");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = ReqlimitConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(limit) = args.limit {
        config.rate_limiting.limit = limit;
    }
    if let Some(window_ms) = args.window_ms {
        config.rate_limiting.window_ms = window_ms;
    }
    if args.trust_proxy_headers {
        config.rate_limiting.trust_proxy_headers = true;
    }
    config.validate()?;

    info!(
        bind_addr = %config.server.bind_addr,
        limit = config.rate_limiting.limit,
        window_ms = config.rate_limiting.window_ms,
        trust_proxy_headers = config.rate_limiting.trust_proxy_headers,
        "Configuration loaded"
    );

    let limit_layer = RateLimitLayer::from_config(&config.rate_limiting)?;
    let tracker = limit_layer.tracker();
    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|interval| spawn_sweeper(&tracker, interval));

    let app = Router::new()
        .route("/", get(success))
        .fallback(success)
        .layer(limit_layer)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.server.bind_addr).await?;
    info!(addr = %config.server.bind_addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!(clients = tracker.client_count(), "reqlimit stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

async fn success() -> &'static str {
    "success"
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
