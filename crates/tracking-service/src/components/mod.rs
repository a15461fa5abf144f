//! # Tracking Service Components
//!
//! The four independently deployable parts of the service:
//!
//! | Name | Type | Ready when |
//! |------|------|------------|
//! | `redis` | [`BackingStoreConnector`] | the store answered `PING` |
//! | `cache` | [`CacheComponent`] | the cache configuration is valid |
//! | `http` | [`HttpFrontEnd`] | the listener is bound |
//! | `stream` | [`StreamConnector`] | the stream subscription was sent |
//!
//! They are wrapped in the [`Component`] enum so one [`Deployable`] implementation, and
//! one [`ServiceContext`], serves all of them.

pub mod backing_store;
pub mod cache;
pub mod http;
pub mod stream;

pub use backing_store::BackingStoreConnector;
pub use cache::{CacheComponent, TrackingCache};
pub use http::HttpFrontEnd;
pub use stream::{StreamConnector, TrackingRecord};

use crate::config::ServiceConfig;
use crate::error::ComponentError;
use async_trait::async_trait;
use deploy_framework::{Deployable, TrafficGate, TrustSettings};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

pub const REDIS: &str = "redis";
pub const CACHE: &str = "cache";
pub const HTTP: &str = "http";
pub const STREAM: &str = "stream";

/// Everything a component instance may depend on.
///
/// Built once per process, after trust configuration, and shared by every instance.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: ServiceConfig,
    /// Effective trust settings, injected explicitly for components that open TLS
    /// connections. The plaintext connectors below do not read them.
    pub trust: TrustSettings,
    pub gate: TrafficGate,
    pub cache: TrackingCache,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig, trust: TrustSettings, gate: TrafficGate) -> Self {
        let cache = TrackingCache::new(config.cache.capacity);
        Self {
            config,
            trust,
            gate,
            cache,
        }
    }
}

#[derive(Debug)]
pub enum Component {
    BackingStore(BackingStoreConnector),
    Cache(CacheComponent),
    HttpFrontEnd(HttpFrontEnd),
    StreamConnector(StreamConnector),
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::BackingStore(_) => REDIS,
            Component::Cache(_) => CACHE,
            Component::HttpFrontEnd(_) => HTTP,
            Component::StreamConnector(_) => STREAM,
        }
    }
}

#[async_trait]
impl Deployable for Component {
    type Context = ServiceContext;
    type Error = ComponentError;

    async fn start(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        match self {
            Component::BackingStore(c) => c.start(ctx).await,
            Component::Cache(c) => c.start(ctx).await,
            Component::HttpFrontEnd(c) => c.start(ctx).await,
            Component::StreamConnector(c) => c.start(ctx).await,
        }
    }

    async fn stop(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        match self {
            Component::BackingStore(c) => c.stop(ctx).await,
            Component::Cache(c) => c.stop(ctx).await,
            Component::HttpFrontEnd(c) => c.stop(ctx).await,
            Component::StreamConnector(c) => c.stop(ctx).await,
        }
    }
}

/// Opens a TCP connection to `addr`, bounded by `timeout_ms`.
async fn connect(addr: &str, timeout_ms: u64) -> Result<TcpStream, ComponentError> {
    debug!(%addr, timeout_ms, "Connecting");
    tokio::time::timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr))
        .await
        .map_err(|_| ComponentError::ConnectTimeout {
            addr: addr.to_string(),
            timeout_ms,
        })?
        .map_err(|source| ComponentError::Connect {
            addr: addr.to_string(),
            source,
        })
}
