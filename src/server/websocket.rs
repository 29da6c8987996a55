//! WebSocket upgrade for the call channel
//!
//! Performs the upgrade handshake and hands the established socket to the
//! call handler on its own task. Capacity is enforced before upgrading so a
//! full node answers with 503 instead of accepting and dropping.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, warn};

use crate::call;
use crate::server::http::AppState;

/// Handle WebSocket upgrade for a participant connection
pub async fn handle_call_upgrade(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if state.hub.registry.len() >= state.args.max_clients() {
        warn!("at capacity, rejecting connection");
        return Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(r#"{"error": "Server at capacity"}"#)))
            .unwrap();
    }

    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            let hub = Arc::clone(&state.hub);

            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => call::handle_connection(hub, ws).await,
                    Err(e) => error!("WebSocket upgrade failed: {:?}", e),
                }
            });

            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from(format!(
                    "WebSocket upgrade failed: {e}"
                ))))
                .unwrap()
        }
    }
}
