//! Web server: axum JSON endpoint plus the static dashboard.
//!
//! Handlers only ever touch the reading store, never a simulator
//! interface, so a stalled poll cycle cannot hold up a request.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::{header, HeaderValue};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use simdata_core::ReadingStore;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub store: Arc<ReadingStore>,
    /// Directory holding `index.html`, `style.css` and `html-lang.json`.
    pub static_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::page_index))
        .route("/index.html", get(routes::page_index))
        .route("/style.css", get(routes::asset_style))
        .route("/html-lang.json", get(routes::asset_lang))
        .route("/data", get(routes::api_data))
        // Prefix matches (`/data?x`, `/style.css.map`, ...) and 404s
        .fallback(routes::fallback)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

/// Bind the listener. Failure here is fatal for the caller.
pub async fn bind(host: &str, port: u16) -> io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
