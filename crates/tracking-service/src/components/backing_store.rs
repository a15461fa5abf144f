//! Backing-store connector.
//!
//! Opens a connection to the Redis-protocol backing store and proves it is usable with an
//! inline `PING`. The instance is ready once the store answers `+PONG`.

use super::{connect, ServiceContext};
use crate::error::ComponentError;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

const PING: &[u8] = b"PING\r\n";
const PONG: &str = "+PONG";

#[derive(Debug, Default)]
pub struct BackingStoreConnector {
    connection: Option<TcpStream>,
}

impl BackingStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub async fn start(&mut self, ctx: &ServiceContext) -> Result<(), ComponentError> {
        let config = &ctx.config.redis;
        let mut stream = connect(&config.addr, config.connect_timeout_ms).await?;

        stream.write_all(PING).await?;
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            stream.read(&mut buf),
        )
        .await
        .map_err(|_| ComponentError::ConnectTimeout {
            addr: config.addr.clone(),
            timeout_ms: config.connect_timeout_ms,
        })??;

        let reply = String::from_utf8_lossy(&buf[..read]).trim().to_string();
        if reply != PONG {
            return Err(ComponentError::Handshake {
                addr: config.addr.clone(),
                reply,
            });
        }

        info!(addr = %config.addr, "Backing store connected");
        self.connection = Some(stream);
        Ok(())
    }

    pub async fn stop(&mut self, _ctx: &ServiceContext) -> Result<(), ComponentError> {
        if let Some(mut stream) = self.connection.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Backing store connection already closed");
            }
        }
        Ok(())
    }
}
