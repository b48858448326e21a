//! HTTP server
//!
//! Wires the login strategies, user repository and sessions into an axum router,
//! with every request passing through the access-log middleware.

pub mod routes;
pub mod session;

pub use session::{PendingLogins, SessionStore};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use tokio::sync::oneshot;
use tracing::info;

use crate::auth::StrategyRegistry;
use crate::logging::{log_requests, RequestLogOptions};
use crate::users::UserRepository;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub strategies: Arc<StrategyRegistry>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<SessionStore>,
    pub pending: Arc<PendingLogins>,
}

impl AppState {
    pub fn new(strategies: StrategyRegistry, users: Arc<dyn UserRepository>) -> Self {
        Self {
            strategies: Arc::new(strategies),
            users,
            sessions: Arc::new(SessionStore::new()),
            pending: Arc::new(PendingLogins::new()),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, log_options: RequestLogOptions) -> Router {
    Router::new()
        .route("/api/auth/signout", get(routes::signout))
        .route("/api/auth/:strategy", get(routes::oauth_call))
        .route("/api/auth/:strategy/callback", get(routes::oauth_callback))
        .route("/api/users/me", get(routes::me))
        .with_state(state)
        .layer(middleware::from_fn_with_state(log_options, log_requests))
}

/// Handle to control the running server
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shutdown the server gracefully and wait for in-flight requests
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Receiver may already be gone
            let _ = tx.send(());
        }
        self.task.await.context("Server task panicked")?;
        Ok(())
    }
}

/// Start serving `app` on `host:port`
///
/// Port 0 lets the OS pick a free port; see [`ServerHandle::addr`].
pub async fn start(host: &str, port: u16, app: Router) -> Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let bound_addr = listener.local_addr()?;

    info!("Server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Server shutting down");
        })
        .await
        .ok();
    });

    Ok(ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        addr: bound_addr,
        task,
    })
}
