//! HTTP front end.
//!
//! Every instance binds its own listener on `HTTP_HOST:HTTP_PORT`; on Unix the port is
//! shared through `SO_REUSEPORT`, so the kernel spreads connections across instances.
//! An instance is ready as soon as its listener is bound. It accepts requests only once
//! the traffic gate opens and stops serving when the gate closes again.
//!
//! Routes:
//! - `GET /health` - liveness
//! - `GET /tracking/{key}` - latest payload for a tracking key, `404` if unknown

use super::{ServiceContext, TrackingCache};
use crate::error::ComponentError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const BACKLOG: u32 = 1024;

pub fn router(cache: TrackingCache) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tracking/{key}", get(tracking))
        .with_state(cache)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn tracking(
    State(cache): State<TrackingCache>,
    Path(key): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    debug!(%key, "Tracking lookup");
    cache.get(&key).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Default)]
pub struct HttpFrontEnd {
    local_addr: Option<SocketAddr>,
    server: Option<JoinHandle<()>>,
}

impl HttpFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    /// The address this instance is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub async fn start(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        let config = &ctx.config.http;
        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|_| {
                ComponentError::InvalidConfig(format!(
                    "HTTP_HOST/HTTP_PORT do not form a socket address: {}:{}",
                    config.host, config.port
                ))
            })?;

        let listener = bind(addr).map_err(|source| ComponentError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let app = router(ctx.cache.clone());
        let gate = ctx.gate.clone();
        let server = tokio::spawn(async move {
            gate.wait_open().await;
            info!(addr = %local_addr, "HTTP front end serving");

            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { gate.wait_closed().await });
            if let Err(e) = serve.await {
                error!(addr = %local_addr, error = %e, "HTTP front end failed");
            }
        });

        info!(addr = %local_addr, "HTTP front end bound");
        self.local_addr = Some(local_addr);
        self.server = Some(server);
        Ok(())
    }

    pub async fn stop(&mut self, _ctx: &ServiceContext) -> Result<(), ComponentError> {
        if let Some(server) = self.server.take() {
            server.abort();
            let _ = server.await;
        }
        if let Some(addr) = self.local_addr.take() {
            info!(%addr, "HTTP front end stopped");
        }
        Ok(())
    }
}

fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(BACKLOG)
}
