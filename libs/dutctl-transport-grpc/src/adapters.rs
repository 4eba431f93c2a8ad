//! Implements the core's [`OutboundSink`]/[`InboundSource`] traits over a
//! tonic bidirectional stream, the sole place in this crate that the core
//! and `tonic` meet.

use async_trait::async_trait;
use dutctl_core::session::broker::{InboundMessage, InboundSource, OutboundMessage, OutboundSink, TransportError};
use tokio::sync::mpsc;
use tonic::{Status, Streaming};

use crate::pb;
use crate::wire::{outbound_to_wire, wire_to_inbound};

/// The write half of a `Run` stream: wraps the `mpsc::Sender` tonic drains
/// to produce the server's response stream.
pub struct GrpcOutboundSink {
    tx: mpsc::Sender<Result<pb::ServerMessage, Status>>,
}

impl GrpcOutboundSink {
    pub fn new(tx: mpsc::Sender<Result<pb::ServerMessage, Status>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OutboundSink for GrpcOutboundSink {
    async fn send(&self, msg: OutboundMessage) -> Result<(), TransportError> {
        self.tx.send(Ok(outbound_to_wire(msg))).await.map_err(|_| TransportError::Closed)
    }
}

/// The read half of a `Run` stream: wraps the inbound `tonic::Streaming`.
pub struct GrpcInboundSource {
    stream: Streaming<pb::ClientMessage>,
}

impl GrpcInboundSource {
    pub fn new(stream: Streaming<pb::ClientMessage>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl InboundSource for GrpcInboundSource {
    async fn recv(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        loop {
            match self.stream.message().await {
                Ok(Some(msg)) => {
                    if let Some(inbound) = wire_to_inbound(msg) {
                        return Ok(Some(inbound));
                    }
                    // Empty oneof: not a protocol message worth surfacing: keep reading.
                }
                Ok(None) => return Ok(None),
                Err(status) => return Err(TransportError::Io(status.to_string())),
            }
        }
    }
}
