mod ai;
mod handlers;
mod metrics;
mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crucible_common::config::ServiceConfig;
use crucible_engine::Engine;

pub struct AppState {
    pub engine: Engine,
    pub config: ServiceConfig,
    /// The AI collaborator, when one is wired in. None means the review,
    /// autofix and error-analysis endpoints answer 503. There is
    /// deliberately no baked-in fallback credential.
    pub suggestions: Option<Arc<dyn ai::SuggestionService>>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Crucible server booting...");

    let config = ServiceConfig::from_env();
    info!(
        compiler = %config.compiler,
        workspace_root = %config.workspace_root.display(),
        max_jobs = config.max_jobs,
        "Loaded configuration"
    );

    // A missing compiler is a deployment problem, not a user-code problem.
    // Every job surfaces it per request; warn early so operators see it
    // before the first submission.
    match std::process::Command::new(&config.compiler)
        .arg("--version")
        .output()
    {
        Ok(_) => info!(compiler = %config.compiler, "Toolchain probe succeeded"),
        Err(err) => warn!(
            compiler = %config.compiler,
            error = %err,
            "Toolchain probe failed; compile requests will be refused as unavailable"
        ),
    }

    let engine = Engine::new(&config);
    let addr = config.addr.clone();
    let state = Arc::new(AppState {
        engine,
        config,
        suggestions: None,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&addr).await.expect("Failed to bind to address");

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            warn!("Received shutdown signal");
        })
        .await
        .expect("Server error");
}
