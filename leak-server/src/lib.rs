//! HTTP front end for [`leak_limit`].
//!
//! `GET /request/` is admitted through a round robin pool of leaky buckets and answers
//! with the channel that accepted it, or `429 Too Many Requests` when every channel is
//! full. `GET /status/` upgrades to a WebSocket that streams channel occupancy.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::routing::get;
use leak_limit::CancellationToken;
use leak_limit::ChannelPool;
use leak_limit::LeakDriver;
use leak_limit::LimiterConfig;
use leak_limit::StatusFeed;
use tokio::net::TcpListener;
use tower::BoxError;
use tower::ServiceBuilder;
use tower_leak::AdmissionLayer;
use tracing::info;

pub mod cli;
pub mod error;
pub mod routes;
pub mod telemetry;

pub use cli::ServiceConfig;
pub use error::ServerError;

/// Shared state behind every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: Arc<ChannelPool>,
    pub feed: StatusFeed,
}

impl AppState {
    /// Build the pool and status feed; the feed ends when `shutdown` is cancelled.
    pub fn new(config: &LimiterConfig, shutdown: &CancellationToken) -> Result<Self, ServerError> {
        config.validate()?;
        let pool = Arc::new(ChannelPool::from_config(config)?);
        let feed = StatusFeed::new(pool.clone(), config.status_interval, shutdown.clone());
        Ok(Self { pool, feed })
    }
}

pub fn create_router(state: AppState) -> Router {
    let admission = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(routes::handle_admission_error))
        .layer(AdmissionLayer::new(state.pool.clone()))
        .map_err(BoxError::from);

    Router::new()
        .route("/request/", get(routes::request))
        .route_layer(admission)
        .route("/status/", get(routes::status))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is cancelled.
///
/// The leak driver runs for the lifetime of the server and is stopped before returning.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    leak_interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let driver = LeakDriver::spawn(state.pool.clone(), leak_interval, &shutdown);
    let app = create_router(state);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .map_err(ServerError::Serve);

    // Stop leaking even if the server failed on its own.
    shutdown.cancel();
    driver.shutdown().await;
    info!("server stopped");
    served
}

/// Bind `config.bind` and serve until `shutdown` is cancelled.
pub async fn run(config: ServiceConfig, shutdown: CancellationToken) -> Result<(), ServerError> {
    let state = AppState::new(&config.limiter, &shutdown)?;
    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind,
            source,
        })?;

    info!(
        addr = %config.bind,
        channels = config.limiter.channels.get(),
        capacity = config.limiter.capacity,
        leak_rate = config.limiter.leak_rate,
        "listening"
    );
    serve(listener, state, config.limiter.leak_interval, shutdown).await
}
