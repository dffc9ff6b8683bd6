//! Heart Disease Prediction API
//!
//! Serves a pre-trained binary classifier over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               HEART DISEASE PREDICTION API              │
//! ├─────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌──────────────────┐  │
//! │  │  Router   │──▶│  Handlers  │──▶│  Classifier      │  │
//! │  │  (Axum)   │   │  validate  │   │  (ONNX Runtime)  │  │
//! │  └───────────┘   │  + format  │   └────────┬─────────┘  │
//! │                  └────────────┘            │            │
//! │                                            ▼            │
//! │                                  ┌──────────────────┐   │
//! │                                  │ heart_disease    │   │
//! │                                  │ .onnx (read once)│   │
//! │                                  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod config;
mod classifier;
mod models;
mod handlers;
mod error;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classifier::{Classifier, OnnxClassifier};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Heart Disease Prediction API starting...");

    // No artifact, no server
    let classifier = OnnxClassifier::load(&config.model_path)
        .context("startup aborted")?;

    // Build application state
    let state = AppState {
        classifier: Arc::new(classifier),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(config: &config::Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "heart_disease_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup, read-only afterwards
    pub classifier: Arc<dyn Classifier>,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home::welcome))
        .route("/health", get(handlers::health::check))
        .route("/predict", post(handlers::predict::predict))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
