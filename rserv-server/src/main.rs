//! rserv server CLI.
//!
//! Run with: `cargo run -p rserv-server -- --help`

use clap::Parser;
use rserv_server::{RservServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ServerConfig::parse().resolve()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = RservServer::new(settings)?;
    let state = server.state();

    let entities: Vec<&str> = state.store.registry().entities().collect();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %state.settings.host,
        port = state.settings.port,
        schema = %state.settings.schema,
        entities = ?entities,
        graph = ?state.settings.rserv_graph,
        graph_enabled = state.settings.graph_enabled,
        cascading_delete = state.settings.cascading_delete,
        patch_null = ?state.settings.patch_null,
        cache = ?state.settings.cache_type,
        cache_ttl = state.settings.cache_ttl,
        fulltext = state.settings.fulltext_enabled,
        workers = state.settings.query_worker_count,
        query_timeout = state.settings.query_timeout,
        max_query_depth = state.settings.max_query_depth,
        "starting rserv"
    );

    server.run().await.map_err(Into::into)
}
