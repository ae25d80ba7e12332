//! Webhook server
//!
//! Receives Kubernetes events (forwarded by an event router) and hands the
//! CompositionDefinition ones to the [`EventDispatcher`].
//!
//! ```text
//! event router
//!     ↓ POST /handle
//! ParserServer (this module)
//!     ↓
//! EventDispatcher → chart pipeline → notebook
//! ```

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use log::info;

use crate::chart::ChartSource;
use crate::handlers::EventDispatcher;
use crate::kube::{ClusterAccess, SecretSource};
use crate::notebook::Reporter;

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
        }
    }
}

impl ServerConfig {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Build the application router around `dispatcher`.
pub fn router<C, R, S>(dispatcher: Arc<EventDispatcher<C, R, S>>) -> Router
where
    C: ClusterAccess + SecretSource + Send + Sync + 'static,
    R: Reporter + Send + Sync + 'static,
    S: ChartSource + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(routes::home))
        .route("/handle", post(routes::handle_event::<C, R, S>))
        .with_state(dispatcher)
}

/// HTTP server for the event webhook.
pub struct ParserServer<C, R, S> {
    config: ServerConfig,
    dispatcher: Arc<EventDispatcher<C, R, S>>,
}

impl<C, R, S> ParserServer<C, R, S>
where
    C: ClusterAccess + SecretSource + Send + Sync + 'static,
    R: Reporter + Send + Sync + 'static,
    S: ChartSource + Send + Sync + 'static,
{
    pub fn new(config: ServerConfig, dispatcher: EventDispatcher<C, R, S>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> std::io::Result<()> {
        let addr: SocketAddr = self
            .config
            .addr()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let app = router(self.dispatcher);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }

    pub fn addr(&self) -> String {
        self.config.addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
