//! HTTP/WebSocket surface.
//!
//! - `GET /{id}`: WebSocket endpoint for each space loaded at startup
//! - `GET /atomspaces`: list space ids
//! - `GET /atomspace/{id}`: node/link counts for one space

pub mod meta;
pub mod socket;

use std::future::Future;
use std::sync::Arc;

use axum::extract::{State, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::error::{HubError, HubResult};
use crate::space::SpaceRegistry;

/// State shared by every handler.
#[derive(Debug)]
pub struct HubState {
    pub registry: Arc<SpaceRegistry>,
    pub config: ServerConfig,
}

/// Build the router: metadata routes plus one WebSocket route per space
/// currently in `registry`.
pub fn router(registry: Arc<SpaceRegistry>, config: ServerConfig) -> Router {
    if config.compression {
        tracing::warn!("compression requested, but this transport does not negotiate permessage-deflate; sending uncompressed");
    }
    let state = Arc::new(HubState { registry, config });

    let mut app = Router::new()
        .route("/atomspaces", get(meta::list_spaces))
        .route("/atomspace/{id}", get(meta::space_info));

    for id in state.registry.list() {
        tracing::debug!(space = %id, "binding endpoint /{id}");
        let path = format!("/{id}");
        app = app.route(
            &path,
            get(
                move |ws: WebSocketUpgrade, State(state): State<Arc<HubState>>| {
                    socket::upgrade(ws, state, id.clone())
                },
            ),
        );
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> HubResult<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("atomspace-hub listening on {addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HubError::Transport {
            message: format!("server error: {e}"),
        })
}
