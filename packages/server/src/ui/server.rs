//! Server execution logic.

use std::{future::Future, path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::infrastructure::store::PUBLIC_UPLOAD_PREFIX;

use super::{
    gateway::SessionGateway,
    handler::{get_room_presence, health_check, websocket_handler},
    signal::shutdown_signal,
    state::{AppState, ConnectionSettings},
};

/// Idle upload reclamation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// 回収処理を走らせる間隔
    pub interval: Duration,
    /// この時間チャンクが届かなかったアップロードを破棄する
    pub idle_timeout: Duration,
}

/// WebSocket chat gateway server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(gateway, settings, sweep, "./uploads");
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// SessionGateway（全ユースケースの窓口）
    gateway: Arc<SessionGateway>,
    settings: ConnectionSettings,
    sweep: SweepSettings,
    /// マージ済みファイルの保存先（`/uploads` で配信する）
    upload_dir: PathBuf,
}

impl Server {
    pub fn new(
        gateway: Arc<SessionGateway>,
        settings: ConnectionSettings,
        sweep: SweepSettings,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            settings,
            sweep,
            upload_dir: upload_dir.into(),
        }
    }

    /// Build the router with every endpoint
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            gateway: self.gateway.clone(),
            settings: self.settings,
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/rooms/{room_id}/presence", get(get_room_presence))
            .with_state(app_state)
            // マージ済みファイル
            .nest_service(PUBLIC_UPLOAD_PREFIX, ServeDir::new(&self.upload_dir))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!(
            "Hiroba chat gateway listening on {}",
            listener.local_addr()?
        );
        tracing::info!("Connect to: ws://{}/ws?token=<jwt>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let sweeper = spawn_upload_sweeper(self.gateway.clone(), self.sweep);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        result
    }
}

/// Periodically reclaim abandoned uploads
fn spawn_upload_sweeper(
    gateway: Arc<SessionGateway>,
    sweep: SweepSettings,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep.interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let reclaimed = gateway.sweep_idle_uploads(sweep.idle_timeout).await;
            if reclaimed > 0 {
                tracing::debug!("Upload sweep reclaimed {} session(s)", reclaimed);
            }
        }
    })
}
