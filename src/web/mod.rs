//! Paginated web viewer over the archive.

pub mod handlers;
pub mod pagination;
pub mod render;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::shutdown::ShutdownController;

pub struct WebState {
    pub store_dir: String,
}

pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_chats))
        .route("/chat/{peer_id}", get(handlers::show_chat))
        .route("/api/chats", get(handlers::api_chats))
        .route("/api/chats/{peer_id}/messages", get(handlers::api_chat_messages))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn serve(store_dir: String, bind: &str, shutdown: ShutdownController) -> Result<()> {
    let state = Arc::new(WebState { store_dir });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    let addr = listener.local_addr()?;
    tracing::info!("archive viewer listening on {}", addr);
    eprintln!("Archive viewer on http://{} (Ctrl+C to stop)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Web server failed")?;
    Ok(())
}
