//! Caller spam detection REST API server.

use caller_api::{config::ApiConfig, server};
use caller_graph::{GraphStoreError, InMemoryGraphStore, SeedReport};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A missing seed file is not fatal: the service starts with whatever else loaded.
fn report_seed(kind: &str, path: &Path, result: Result<SeedReport, GraphStoreError>) {
    match result {
        Ok(report) => tracing::info!(
            kind,
            path = %path.display(),
            nodes = report.nodes_added,
            edges = report.edges_added,
            skipped = report.skipped.len(),
            "seed data loaded"
        ),
        Err(e) => tracing::warn!(kind, path = %path.display(), error = %e, "seed data not loaded"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env();
    let graph = Arc::new(InMemoryGraphStore::new());

    report_seed(
        "users",
        &config.user_seed_data_path,
        graph.load_user_seed_file(&config.user_seed_data_path).await,
    );
    report_seed(
        "calls",
        &config.call_data_path,
        graph.load_graph_seed_file(&config.call_data_path).await,
    );

    let spam = config.build_spam_service(graph.clone());
    tracing::info!(rules = ?spam.get_registered_rules(), threshold = spam.threshold(), "spam detection ready");

    let state = Arc::new(server::AppState { graph, spam });
    let app = server::router(state);
    tracing::info!("caller API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
