//! # HTTP Server
//!
//! JSON API over the template store, the batch orchestrator and the
//! single-item renderer. Generated files are served statically under
//! `/generated`.
//!
//! ## Usage
//!
//! ```bash
//! certpress serve --listen 0.0.0.0:5000 --data-dir /srv/certpress
//! ```
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/uploads` | store a spreadsheet, return its headers |
//! | `GET/POST /api/templates` | list / create templates |
//! | `GET/PUT /api/templates/:id` | fetch / merge-update a template |
//! | `POST /api/batches` | register a batch |
//! | `POST /api/batches/:id/generate` | run a batch to completion |
//! | `GET /api/batches/:id/status` | batch record |
//! | `GET /api/batches/:id/download` | the batch archive |
//! | `GET /api/batches/:id/files/:name` | one generated certificate |
//! | `POST /api/render/preview` | in-memory PNG preview |

mod handlers;
mod state;

pub use handlers::ApiError;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Settings;
use crate::error::CertError;

/// Upload size limit for spreadsheets.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let generated = ServeDir::new(state.settings.generated_dir());

    Router::new()
        .route("/", get(handlers::index))
        // Uploads
        .route(
            "/api/uploads",
            post(handlers::uploads::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Templates
        .route(
            "/api/templates",
            get(handlers::templates::list).post(handlers::templates::create),
        )
        .route(
            "/api/templates/:id",
            get(handlers::templates::fetch).put(handlers::templates::update),
        )
        // Batches
        .route("/api/batches", post(handlers::batches::create))
        .route("/api/batches/:id/generate", post(handlers::batches::generate))
        .route("/api/batches/:id/status", get(handlers::batches::status))
        .route("/api/batches/:id/download", get(handlers::batches::download))
        .route("/api/batches/:id/files/:name", get(handlers::batches::file))
        // Rendering
        .route("/api/render/preview", post(handlers::render::preview))
        .nest_service("/generated", generated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// Creates the data directories and seeds the template collection first.
pub async fn serve(settings: Settings, listen_addr: &str) -> Result<(), CertError> {
    settings.ensure_dirs()?;
    let state = Arc::new(AppState::new(settings)?);
    state.templates.seed_if_missing().await?;

    info!(
        listen = listen_addr,
        data_dir = %state.settings.data_dir.display(),
        "certpress HTTP server starting"
    );

    let listener = tokio::net::TcpListener::bind(listen_addr).await.map_err(|e| {
        CertError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", listen_addr, e),
        ))
    })?;

    axum::serve(listener, router(state)).await?;
    Ok(())
}
