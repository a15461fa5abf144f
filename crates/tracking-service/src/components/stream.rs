//! Event stream connector.
//!
//! Each instance opens its own connection to the stream endpoint and subscribes with a
//! `SUBSCRIBE <stream>` line. The instance is ready once subscribed. After the traffic
//! gate opens it ingests newline-delimited JSON records of the form
//! `{"key": "...", "payload": {...}}` into the tracking cache.

use super::{connect, ServiceContext, TrackingCache};
use crate::error::ComponentError;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One record read from the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingRecord {
    pub key: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
pub struct StreamConnector {
    ingest: Option<JoinHandle<()>>,
}

impl StreamConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        let config = &ctx.config.stream;
        let mut stream = connect(&config.addr, config.connect_timeout_ms).await?;
        stream
            .write_all(format!("SUBSCRIBE {}\n", config.name).as_bytes())
            .await?;

        info!(addr = %config.addr, stream = %config.name, "Stream subscribed");

        let cache = ctx.cache.clone();
        let gate = ctx.gate.clone();
        let name = config.name.clone();
        self.ingest = Some(tokio::spawn(async move {
            gate.wait_open().await;
            ingest(stream, cache, &name).await;
        }));
        Ok(())
    }

    pub async fn stop(&mut self, _ctx: &ServiceContext) -> Result<(), ComponentError> {
        if let Some(ingest) = self.ingest.take() {
            ingest.abort();
            let _ = ingest.await;
            debug!("Stream ingestion stopped");
        }
        Ok(())
    }
}

/// Reads records until the peer closes the connection. Malformed lines are skipped.
async fn ingest(stream: TcpStream, cache: TrackingCache, name: &str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<TrackingRecord>(&line) {
                Ok(record) => {
                    debug!(stream = %name, key = %record.key, "Tracking record received");
                    cache.insert(record.key, record.payload);
                }
                Err(e) => warn!(stream = %name, error = %e, "Skipping malformed record"),
            },
            Ok(None) => {
                info!(stream = %name, "Stream closed by peer");
                break;
            }
            Err(e) => {
                warn!(stream = %name, error = %e, "Stream read failed");
                break;
            }
        }
    }
}
