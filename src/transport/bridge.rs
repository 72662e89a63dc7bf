//! TCP bridge to the switch agent
//!
//! The agent owns the OpenFlow sessions. It connects to the bridge, writes
//! [`SwitchEvent`] lines and reads [`SwitchCommand`] lines. One agent is
//! served at a time; while none is connected, mutations fail with
//! [`GatewayError::Disconnected`].

use super::event::{SwitchCommand, SwitchEvent};
use crate::flow::{Action, DatapathId, FlowGateway, FlowMatch, GatewayError};
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// [`FlowGateway`] that queues commands for the connected agent
#[derive(Debug, Clone)]
pub struct BridgeGateway {
    commands: mpsc::UnboundedSender<SwitchCommand>,
    link_up: Arc<AtomicBool>,
}

impl BridgeGateway {
    pub fn is_linked(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    fn send(&self, command: SwitchCommand) -> std::result::Result<(), GatewayError> {
        let dpid = command.dpid();
        if !self.is_linked() {
            return Err(GatewayError::Disconnected(dpid));
        }
        self.commands
            .send(command)
            .map_err(|_| GatewayError::Disconnected(dpid))
    }
}

impl FlowGateway for BridgeGateway {
    fn install(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
        actions: &[Action],
    ) -> std::result::Result<(), GatewayError> {
        self.send(SwitchCommand::Install {
            dpid,
            priority,
            flow_match: flow_match.clone(),
            actions: actions.to_vec(),
        })
    }

    fn remove(
        &self,
        dpid: DatapathId,
        priority: u16,
        flow_match: &FlowMatch,
    ) -> std::result::Result<(), GatewayError> {
        self.send(SwitchCommand::Remove {
            dpid,
            priority,
            flow_match: flow_match.clone(),
        })
    }

    fn flood(
        &self,
        dpid: DatapathId,
        in_port: u16,
        data: &[u8],
    ) -> std::result::Result<(), GatewayError> {
        self.send(SwitchCommand::Flood {
            dpid,
            in_port,
            data: data.to_vec(),
        })
    }

    fn packet_out(
        &self,
        dpid: DatapathId,
        data: &[u8],
        actions: &[Action],
    ) -> std::result::Result<(), GatewayError> {
        self.send(SwitchCommand::PacketOut {
            dpid,
            data: data.to_vec(),
            actions: actions.to_vec(),
        })
    }
}

pub struct SwitchBridge {
    listener: TcpListener,
    commands: mpsc::UnboundedReceiver<SwitchCommand>,
    link_up: Arc<AtomicBool>,
}

impl SwitchBridge {
    /// Listen for the agent. The returned gateway stays valid across agent
    /// reconnects.
    pub async fn bind(addr: SocketAddr) -> Result<(Self, BridgeGateway)> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "switch bridge listening");

        let (tx, rx) = mpsc::unbounded_channel();
        let link_up = Arc::new(AtomicBool::new(false));
        let gateway = BridgeGateway {
            commands: tx,
            link_up: link_up.clone(),
        };
        Ok((
            Self {
                listener,
                commands: rx,
                link_up,
            },
            gateway,
        ))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve agents one after another, forwarding their events to `events`.
    /// Returns when the event receiver or every gateway clone is gone.
    pub async fn run(mut self, events: mpsc::Sender<SwitchEvent>) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("bridge accept failed: {}", e);
                    continue;
                }
            };
            info!(%peer, "switch agent connected");
            self.link_up.store(true, Ordering::Release);

            let outcome = self.serve(stream, &events).await;

            self.link_up.store(false, Ordering::Release);
            let mut dropped = 0;
            while self.commands.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                warn!(dropped, "discarded commands queued for the lost agent");
            }

            match outcome {
                Ok(true) => info!(%peer, "switch agent disconnected"),
                Ok(false) => {
                    info!("bridge channels closed, switch bridge stopping");
                    return Ok(());
                }
                Err(e) => warn!(%peer, "switch agent connection failed: {}", e),
            }
        }
    }

    /// `Ok(true)` when the agent hung up, `Ok(false)` when a channel closed
    async fn serve(
        &mut self,
        stream: TcpStream,
        events: &mpsc::Sender<SwitchEvent>,
    ) -> Result<bool> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Ok(true);
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<SwitchEvent>(&line) {
                        Ok(event) => {
                            if events.send(event).await.is_err() {
                                return Ok(false);
                            }
                        }
                        Err(e) => warn!(bytes = line.len(), "skipping malformed switch event: {}", e),
                    }
                }
                command = self.commands.recv() => {
                    // The bridge holds no sender of its own, so `None` means
                    // every gateway clone was dropped.
                    let Some(command) = command else {
                        return Ok(false);
                    };
                    debug!(dpid = %command.dpid(), "sending switch command");
                    let mut line = serde_json::to_vec(&command)?;
                    line.push(b'\n');
                    writer.write_all(&line).await?;
                }
            }
        }
    }
}
