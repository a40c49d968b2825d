//! Server execution logic.

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::{
    handler::{
        get_chat_config, get_chat_messages, get_moderation_messages, get_stats, get_viewers,
        health_check, send_system_message, update_chat_config, update_message_visibility,
        update_stream_status, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Chat server
///
/// Serves the `/entry` WebSocket endpoint and the public and admin HTTP APIs.
///
/// # Example
///
/// ```ignore
/// let server = Server::new(app_state);
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Build the router with all endpoints
    pub fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/entry", get(websocket_handler))
            // 公開 HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/chat", get(get_chat_messages))
            .route("/api/stats", get(get_stats))
            // 管理 HTTP エンドポイント
            .route("/api/admin/chat/messages", get(get_moderation_messages))
            .route(
                "/api/admin/chat/updatemessagevisibility",
                post(update_message_visibility),
            )
            .route("/api/admin/chat/system", post(send_system_message))
            .route("/api/admin/viewers", get(get_viewers))
            .route("/api/admin/stream/status", post(update_stream_status))
            .route(
                "/api/admin/config/chat",
                get(get_chat_config).post(update_chat_config),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the chat server until Ctrl+C or SIGTERM
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/entry", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// The hub is stopped as soon as `shutdown` resolves so that open WebSocket
    /// sessions are closed, and stats are saved once the server has drained.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let hub = self.state.hub.clone();
        let signal = async move {
            shutdown.await;
            if let Err(e) = hub.shutdown().await {
                tracing::warn!("Chat hub already stopped: {}", e);
            }
        };

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        if let Err(e) = self.state.presence.save().await {
            tracing::error!("Failed to save stats on shutdown: {}", e);
        }
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}
