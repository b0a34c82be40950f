use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, Result};
use crate::gateway::LiveGateway;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Router exposing the live gateway at `/ws`
pub fn router(gateway: Arc<LiveGateway>) -> Router {
    Router::new()
        .route("/ws", get(handle_upgrade))
        .with_state(gateway)
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(gateway): State<Arc<LiveGateway>>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade requested");
    ws.on_upgrade(move |socket| serve_socket(gateway, socket))
}

/// Pump one WebSocket session until the peer goes away.
pub async fn serve_socket(gateway: Arc<LiveGateway>, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (session, mut events) = gateway.connect().await;
    info!("Client {} connected ({} total)", session, gateway.client_count().await);

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize {} event: {}", event.name(), e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // Errors are already reported to the sender
                let _ = gateway.handle_frame(session, &text).await;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame from {}", session);
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("WebSocket error from {}: {}", session, e);
                break;
            }
            _ => {}
        }
    }

    gateway.disconnect(session).await;
    writer.abort();
    info!("Client {} disconnected", session);
}

/// HTTP listener hosting the gateway plus any extra routes
pub struct GatewayServer {
    gateway: Arc<LiveGateway>,
    extra_routes: Mutex<Option<Router>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl GatewayServer {
    pub fn new(gateway: Arc<LiveGateway>) -> Self {
        Self {
            gateway,
            extra_routes: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            serve_task: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Mount additional routes (REST API, health) next to `/ws`
    pub fn with_routes(gateway: Arc<LiveGateway>, routes: Router) -> Self {
        let mut server = Self::new(gateway);
        server.extra_routes = Mutex::new(Some(routes));
        server
    }

    /// Bind and begin serving. Returns the bound address, which differs
    /// from `addr` when port 0 was requested.
    pub async fn start(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let mut task_slot = self.serve_task.lock().await;
        if task_slot.is_some() {
            return Err(GatewayError::AlreadyRunning);
        }

        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;

        let mut app = router(Arc::clone(&self.gateway));
        if let Some(extra) = self.extra_routes.lock().await.take() {
            app = app.merge(extra);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                error!("Gateway server error: {}", e);
            }
        });

        *task_slot = Some(task);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);
        *self.local_addr.lock().await = Some(bound);

        info!("🚀 Live gateway listening on {}", bound);
        Ok(bound)
    }

    /// Stop accepting connections and wait briefly for open sessions.
    pub async fn stop(&self) -> Result<()> {
        let Some(mut task) = self.serve_task.lock().await.take() else {
            return Err(GatewayError::NotStarted);
        };

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            warn!("Open sessions outlived the shutdown grace period; aborting");
            task.abort();
        }

        *self.local_addr.lock().await = None;
        info!("Live gateway stopped");
        Ok(())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    pub fn gateway(&self) -> &Arc<LiveGateway> {
        &self.gateway
    }
}
