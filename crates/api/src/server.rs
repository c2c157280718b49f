// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! Wires the provider manager, the status aggregator and the router together and
//! runs them until a shutdown signal cancels the shared `CancellationToken`.

use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, http::HeaderName};
use external_apis::{
    ProviderManager, ProviderRegistry, ResilienceConfig, register_builtin_providers,
};
use hyper::Request;
use instrumentation::{EventBus, InstrumentationCollector, ProviderStateAggregator};
use tokio::{net::TcpListener, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    routes::create_routes,
    state::ServerState,
};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How long open connections may drain after shutdown starts
    pub graceful_timeout: Duration,
    /// How long background tasks get to stop after the listener closes
    pub force_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    state: ServerState,
    cancellation_token: CancellationToken,
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create a server over the builtin providers
    ///
    /// Provider settings are read from `resilience*.json` in `config.config_dir` and
    /// `RESILIENCE__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ResilienceConfig` for invalid provider settings or
    /// `ServerError::Provider` if a provider cannot be built.
    pub fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        let resilience =
            ResilienceConfig::load_from(&config.config_dir, &config.environment.to_string())?;
        let manager = Self::create_manager(&resilience)?;
        Ok(Self::with_manager(config, shutdown_config, Arc::new(manager)))
    }

    /// Instantiate every enabled builtin provider
    fn create_manager(resilience: &ResilienceConfig) -> ServerResult<ProviderManager> {
        let mut registry = ProviderRegistry::new();
        register_builtin_providers(&mut registry)?;

        let collector = Arc::new(InstrumentationCollector::from_capacity(
            resilience.metrics_capacity,
        ));
        let events = EventBus::new(resilience.event_capacity);
        ProviderManager::from_config(&registry, resilience, collector, events)
            .map_err(ServerError::from)
    }

    /// Create a server around an existing manager
    pub fn with_manager(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        manager: Arc<ProviderManager>,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let state = ServerState::new(
            config.clone(),
            manager,
            Arc::new(ProviderStateAggregator::new()),
            cancellation_token.child_token(),
        );
        let router = Self::create_router(state.clone());

        Self {
            config,
            router,
            state,
            cancellation_token,
            graceful_shutdown_config,
        }
    }

    /// Create application router with middleware
    fn create_router(state: ServerState) -> Router {
        let timeout_duration = state.config().timeout_seconds.value();

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id, path = %req.uri().path())
                    } else {
                        error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(timeout_duration));

        create_routes().layer(middleware).with_state(state)
    }

    /// Feed provider events into the status aggregator until shutdown
    fn start_aggregator(&self) -> JoinHandle<()> {
        let events = self.state.manager().events().subscribe();
        Arc::clone(self.state.aggregator()).spawn(events, self.cancellation_token.child_token())
    }

    /// Run the server with coordinated graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Startup` if the server fails to start.
    pub async fn run(self) -> ServerResult<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        info!(
            address = %actual_addr,
            environment = %self.config.environment,
            sources = ?self.state.manager().sources(),
            "provider gateway starting",
        );

        let aggregator = self.start_aggregator();

        let signal_token = self.cancellation_token.clone();
        tokio::spawn(async move {
            Self::shutdown_signal_handler(signal_token).await;
        });

        let serve_token = self.cancellation_token.clone();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                serve_token.cancelled().await;
                info!("listener closed, draining open connections");
            })
            .into_future();

        let drain_token = self.cancellation_token.clone();
        let drain_limit = self.graceful_shutdown_config.graceful_timeout;
        let server_result = tokio::select! {
            result = serve => result,
            () = async move {
                drain_token.cancelled().await;
                tokio::time::sleep(drain_limit).await;
            } => {
                warn!(timeout_secs = drain_limit.as_secs(), "connection drain timed out");
                Ok(())
            }
        };

        self.cancellation_token.cancel();
        if timeout(self.graceful_shutdown_config.force_timeout, aggregator)
            .await
            .is_err()
        {
            warn!("status aggregator did not stop in time");
        }

        if let Err(e) = server_result {
            error!(error = ?e, "Server error during shutdown");
            Err(ServerError::Shutdown { source: e })
        } else {
            info!("provider gateway shut down gracefully");
            Ok(())
        }
    }

    /// Cancel `cancellation_token` on SIGINT or SIGTERM
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                "CTRL+C"
            }
        };

        tokio::select! {
            signal_name = signal_received => {
                warn!(signal = signal_name, "shutdown signal received, cancelling all operations");
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {}
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let addr = self.config.socket_addr();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let _aggregator = self.start_aggregator();

        let token = self.cancellation_token.child_token();
        let task = token.child_token();
        tokio::spawn(async move {
            let _ = axum::serve(listener, self.router)
                .with_graceful_shutdown(async move { task.cancelled().await })
                .await;
        });

        Ok((actual_addr, token))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state for testing
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}
