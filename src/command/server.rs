//! TCP command server
//!
//! One message per connection: the peer writes a JSON object and closes its
//! write side. Connections are served strictly one after another, so a peer
//! that never closes stalls every later command unless a read timeout is
//! configured. Messages larger than the configured maximum are dropped
//! without being dispatched.

use super::dispatch::Dispatcher;
use crate::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Largest command accepted by default (1 MiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Upper bound for reading one message. `None` waits for the peer.
    pub read_timeout: Option<Duration>,
    /// Write a `{"request_success", "message"}` reply before closing
    pub reply_status: bool,
    pub max_message_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            read_timeout: None,
            reply_status: false,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

pub struct CommandServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    options: ServerOptions,
}

impl CommandServer {
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        options: ServerOptions,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "command server listening");
        Ok(Self {
            listener,
            dispatcher,
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. A connection being served when the
    /// signal arrives is finished first.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("command server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.serve(stream, peer).await,
                    Err(e) => warn!("accept failed: {}", e),
                },
            }
        }
    }

    async fn serve(&self, mut stream: TcpStream, peer: SocketAddr) {
        let Some(payload) = self.read_message(&mut stream, peer).await else {
            return;
        };
        debug!(%peer, bytes = payload.len(), "command received");

        let dispatcher = self.dispatcher.clone();
        let reply =
            match tokio::task::spawn_blocking(move || dispatcher.handle_payload(&payload)).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(%peer, "command handler panicked: {}", e);
                    return;
                }
            };

        if self.options.reply_status {
            let write = async {
                let body = serde_json::to_vec(&reply)?;
                stream.write_all(&body).await?;
                stream.shutdown().await?;
                Ok::<_, crate::Error>(())
            };
            if let Err(e) = write.await {
                warn!(%peer, "failed to write status reply: {}", e);
            }
        }
    }

    async fn read_message(&self, stream: &mut TcpStream, peer: SocketAddr) -> Option<Vec<u8>> {
        let max = self.options.max_message_bytes;
        // one byte past the cap tells an oversized message from one that fits exactly
        let mut reader = (&mut *stream).take((max as u64).saturating_add(1));
        let mut payload = Vec::new();
        let read = match self.options.read_timeout {
            None => reader.read_to_end(&mut payload).await,
            Some(limit) => {
                let timed = tokio::time::timeout(limit, reader.read_to_end(&mut payload)).await;
                match timed {
                    Ok(read) => read,
                    Err(_) => {
                        warn!(%peer, timeout = ?limit, bytes = payload.len(), "command read timed out, dropping connection");
                        return None;
                    }
                }
            }
        };
        match read {
            Ok(_) if payload.len() > max => {
                warn!(%peer, max_bytes = max, "command exceeds size limit, dropping connection");
                None
            }
            Ok(_) => Some(payload),
            Err(e) => {
                warn!(%peer, "command read failed: {}", e);
                None
            }
        }
    }
}
