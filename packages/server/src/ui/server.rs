//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, http::HeaderValue, routing::get};
use hiroba_shared::time::{Clock, MonotonicClock, SystemClock};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::ServerConfig,
    domain::ConnectionRegistry,
    error::ServerError,
    infrastructure::InMemoryConnectionRegistry,
    usecase::{ConnectClientUseCase, DisconnectClientUseCase, RelayChatUseCase},
};

use super::{
    handler::{debug_connections, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket chat relay server
///
/// This struct encapsulates the server configuration and provides methods to run the server.
///
/// # Example
///
/// ```ignore
/// let server = Server::from_config(ServerConfig::default())?;
/// server.run().await?;
/// ```
pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl Server {
    /// Create a new Server instance from already wired dependencies
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `registry` - Registry shared by the use cases
    /// * `connect_client_usecase` - UseCase for connection registration
    /// * `disconnect_client_usecase` - UseCase for connection removal
    /// * `relay_chat_usecase` - UseCase for chat relaying
    pub fn new(
        config: ServerConfig,
        registry: Arc<dyn ConnectionRegistry>,
        connect_client_usecase: Arc<ConnectClientUseCase>,
        disconnect_client_usecase: Arc<DisconnectClientUseCase>,
        relay_chat_usecase: Arc<RelayChatUseCase>,
    ) -> Self {
        let state = Arc::new(AppState {
            registry,
            connect_client_usecase,
            disconnect_client_usecase,
            relay_chat_usecase,
            ping_interval: config.ping_interval,
            idle_timeout: config.idle_timeout(),
        });

        Self { config, state }
    }

    /// Wire the in-memory registry and the use cases with the system clock
    pub fn from_config(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Wire the in-memory registry and the use cases with the given clock
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        // 1. Registry (in-memory)
        let registry: Arc<dyn ConnectionRegistry> =
            Arc::new(InMemoryConnectionRegistry::new(clock.clone()));

        // 2. UseCases
        let connect_client_usecase = Arc::new(ConnectClientUseCase::new(registry.clone()));
        let disconnect_client_usecase = Arc::new(DisconnectClientUseCase::new(registry.clone()));
        let relay_chat_usecase = Arc::new(RelayChatUseCase::new(
            registry.clone(),
            Arc::new(MonotonicClock::new(clock)),
            config.delivery_policy,
        ));

        // 3. Server
        Self::new(
            config,
            registry,
            connect_client_usecase,
            disconnect_client_usecase,
            relay_chat_usecase,
        )
    }

    /// Build the axum `Router` with all relay routes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidCorsOrigin`] if the configured origin is
    /// not a valid header value.
    pub fn router(&self) -> Result<Router, ServerError> {
        let app = Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/debug/connections", get(debug_connections))
            .layer(cors_layer(&self.config.cors_origin)?)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        Ok(app)
    }

    /// Run the relay server on the configured host and port until Ctrl+C
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self) -> Result<(), ServerError> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router()?;

        tracing::info!(
            "Chat relay listening on {} (delivery policy: {:?})",
            listener.local_addr()?,
            self.state.relay_chat_usecase.policy()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

fn cors_layer(origin: &str) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origin == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = HeaderValue::from_str(origin)
        .map_err(|_| ServerError::InvalidCorsOrigin(origin.to_string()))?;
    Ok(layer.allow_origin(origin))
}
