//! Route handlers.
//!
//! `/data` serializes a copy of the store; the other paths are files read
//! from the static directory on every request, 404 if absent. Paths are
//! matched by prefix, so `/data?ts=1` and `/index.html#top` behave like
//! their plain forms.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::web::AppState;

const JSON: &str = "application/json; charset=utf-8";

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// A file served from the static directory.
#[derive(Debug, PartialEq, Eq)]
pub struct Asset {
    pub file: &'static str,
    pub content_type: &'static str,
}

pub const INDEX: Asset = Asset {
    file: "index.html",
    content_type: "text/html; charset=utf-8",
};

pub const STYLE: Asset = Asset {
    file: "style.css",
    content_type: "text/css; charset=utf-8",
};

pub const LANG: Asset = Asset {
    file: "html-lang.json",
    content_type: JSON,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Resource {
    Asset(&'static Asset),
    Data,
    NotFound,
}

/// Map a request path to what it serves.
pub fn resolve(path: &str) -> Resource {
    if path == "/" || path.starts_with("/index.html") {
        Resource::Asset(&INDEX)
    } else if path.starts_with("/style.css") {
        Resource::Asset(&STYLE)
    } else if path.starts_with("/html-lang.json") {
        Resource::Asset(&LANG)
    } else if path.starts_with("/data") {
        Resource::Data
    } else {
        Resource::NotFound
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / and /index.html
pub async fn page_index(State(state): State<Arc<AppState>>) -> Response {
    send_asset(&state, &INDEX).await
}

/// GET /style.css
pub async fn asset_style(State(state): State<Arc<AppState>>) -> Response {
    send_asset(&state, &STYLE).await
}

/// GET /html-lang.json
pub async fn asset_lang(State(state): State<Arc<AppState>>) -> Response {
    send_asset(&state, &LANG).await
}

/// GET /data: latest completed reading as JSON.
pub async fn api_data(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.snapshot();
    match serde_json::to_vec(&snapshot) {
        Ok(body) => ([(header::CONTENT_TYPE, JSON)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Cannot serialize snapshot");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Everything the exact routes don't catch.
pub async fn fallback(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    match resolve(uri.path()) {
        Resource::Asset(asset) => send_asset(&state, asset).await,
        Resource::Data => api_data(State(state)).await,
        Resource::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn send_asset(state: &AppState, asset: &Asset) -> Response {
    let path = state.static_dir.join(asset.file);
    match tokio::fs::read(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, asset.content_type)], body).into_response(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Static asset missing");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
