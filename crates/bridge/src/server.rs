//! WebSocket transport: `GET /bridge`, one response frame per text frame.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::BridgeError;
use crate::handler::BridgeHandler;

pub fn router(handler: Arc<BridgeHandler>) -> Router {
    Router::new()
        .route("/bridge", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(handler)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    handler: Arc<BridgeHandler>,
    addr: &str,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr = %addr, "Bridge listening on /bridge");

    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(handler): State<Arc<BridgeHandler>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, handler))
}

async fn handle_connection(mut socket: WebSocket, handler: Arc<BridgeHandler>) {
    info!("Bridge client connected");

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "Bridge socket error");
                break;
            }
        };

        let response = handler.handle_text(text.as_str()).await;
        let json = serde_json::to_string(&response).unwrap_or_default();
        if socket.send(WsMessage::Text(json.into())).await.is_err() {
            break;
        }
    }

    info!("Bridge client disconnected");
}
