//! rserv HTTP server.
//!
//! A REST prototyping server over the file-backed document store, with the
//! graph overlay and asynchronous Sulpher query execution.
//!
//! # Example
//!
//! ```ignore
//! use rserv_server::{RservServer, ServerConfig};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = ServerConfig::parse().resolve().unwrap();
//!     let server = RservServer::new(settings).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod view;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use routes::build_router;
pub use state::{AppState, FulltextIndex};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The configured server: state plus router.
pub struct RservServer {
    state: Arc<AppState>,
    router: Router,
}

impl RservServer {
    /// Open the store, start the job workers, and build the router. Must
    /// run inside a tokio runtime.
    pub fn new(settings: rserv_core::Settings) -> rserv_core::Result<Self> {
        let state = Arc::new(AppState::new(settings)?);
        let router = routes::build_router(state.clone());
        Ok(Self { state, router })
    }

    /// The application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.settings.host, self.state.settings.port
        );
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "rserv listening");
        axum::serve(listener, self.router).await
    }
}
