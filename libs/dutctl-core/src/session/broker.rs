//! The Session Broker (C5): multiplexes every `Session` call a running
//! module makes onto a single duplex stream, via a pair of pump tasks
//! talking to rendezvous-style queues. Transport-agnostic: callers supply
//! an [`OutboundSink`] / [`InboundSource`] pair, and `dutctl-transport-grpc`
//! is the only crate that knows these are backed by a gRPC stream.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{ConsoleReader, ConsoleWriter, FileReader, FileSource, Session, SessionError};

/// A command envelope: the first (and only valid first) message on a `Run`
/// stream.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub device: String,
    pub command: String,
    pub args: Vec<String>,
}

/// A message flowing from the agent to the client.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Print(String),
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    FileRequest { name: String },
    File { name: String, size: u64, data: Vec<u8> },
}

/// A message flowing from the client to the agent.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Command(CommandEnvelope),
    Stdin(Vec<u8>),
    File { name: String, size: u64, data: Vec<u8> },
}

/// Errors surfaced by a [`Transport`] implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(String),
    #[error("transport closed")]
    Closed,
}

/// The broker's write half of the duplex stream. Implemented by the
/// transport crate; the broker only ever needs to push a message out.
#[async_trait]
pub trait OutboundSink: Send + Sync + 'static {
    async fn send(&self, msg: OutboundMessage) -> Result<(), TransportError>;
}

/// The broker's read half of the duplex stream. `recv` returning `Ok(None)`
/// means the client closed its send side cleanly.
#[async_trait]
pub trait InboundSource: Send + 'static {
    async fn recv(&mut self) -> Result<Option<InboundMessage>, TransportError>;
}

struct PendingFileRequest {
    name: String,
    delivery: oneshot::Sender<Vec<u8>>,
}

struct OutboundFileJob {
    name: String,
    size: u64,
    source: Box<dyn FileSource + Send>,
}

/// One `Session` call, queued in the order the module issued it.
///
/// Every outbound-facing `Session` method funnels through this single
/// channel instead of a per-kind queue: with one channel, the order items
/// are received in is exactly the order they were sent in, so the to-client
/// pump never has to reconstruct call order across kinds. A per-kind queue
/// can't give that guarantee — each one buffers independently, so two calls
/// of different kinds made back-to-back can both enqueue before either is
/// drained, and whichever queue the pump happens to poll first wins.
pub(crate) enum OutboundEvent {
    Print(String),
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    FileRequest { name: String, delivery: oneshot::Sender<Vec<u8>> },
    OutboundFile(OutboundFileJob),
}

/// The `Session` implementation backed by the broker's queue. Cheap to
/// clone (every clone shares the same underlying channel).
#[derive(Clone)]
pub struct SessionHandle {
    events_tx: mpsc::Sender<OutboundEvent>,
    stdin_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>>,
}

#[async_trait]
impl Session for SessionHandle {
    async fn print(&self, text: &str) {
        let _ = self.events_tx.send(OutboundEvent::Print(text.to_string())).await;
    }

    fn console(&self) -> (ConsoleReader, ConsoleWriter, ConsoleWriter) {
        (
            ConsoleReader::new(self.stdin_rx.clone()),
            ConsoleWriter::new(self.events_tx.clone(), super::ConsoleStream::Stdout),
            ConsoleWriter::new(self.events_tx.clone(), super::ConsoleStream::Stderr),
        )
    }

    async fn request_file(&self, name: &str) -> Result<FileReader, SessionError> {
        let (delivery_tx, delivery_rx) = oneshot::channel();
        self.events_tx
            .send(OutboundEvent::FileRequest { name: name.to_string(), delivery: delivery_tx })
            .await
            .map_err(|_| SessionError::BrokerClosed)?;
        Ok(FileReader::new(delivery_rx))
    }

    async fn send_file(&self, name: &str, size: u64, source: Box<dyn FileSource + Send>) -> Result<(), SessionError> {
        self.events_tx
            .send(OutboundEvent::OutboundFile(OutboundFileJob { name: name.to_string(), size, source }))
            .await
            .map_err(|_| SessionError::BrokerClosed)
    }
}

/// Owns the two pump tasks for one `Run` invocation.
pub struct SessionBroker;

impl SessionBroker {
    /// Spawns the to-client and from-client pumps and returns a `Session`
    /// handle plus a channel that reports at most one broker-side failure.
    ///
    /// `cancel` is the module-scoped cancellation token (a child of the
    /// RPC's own token): cancelling it unblocks the to-client pump once it
    /// has drained everything already queued, which is what lets modules
    /// that fail mid-sequence still have their prior output delivered
    /// before the RPC is aborted.
    pub fn start(
        cancel: CancellationToken,
        sink: Arc<dyn OutboundSink>,
        mut source: Box<dyn InboundSource>,
    ) -> (Arc<SessionHandle>, oneshot::Receiver<TransportError>) {
        let (events_tx, mut events_rx) = mpsc::channel::<OutboundEvent>(1);
        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(1);

        let pending_request: Arc<Mutex<Option<PendingFileRequest>>> = Arc::new(Mutex::new(None));
        let (err_tx, err_rx) = oneshot::channel::<TransportError>();
        let err_tx = Arc::new(Mutex::new(Some(err_tx)));

        // to-client pump: the message branch is listed ahead of cancellation
        // so that, whenever both are ready in the same poll, an already
        // queued message always wins and gets delivered first. Every
        // `Session` call funnels through the one `events_rx` queue, so
        // draining it in receive order reproduces the module's call order
        // on the wire regardless of which kinds of calls it mixed.
        {
            let sink = sink.clone();
            let pending_request = pending_request.clone();
            let err_tx = err_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        Some(event) = events_rx.recv() => {
                            let sent = match event {
                                OutboundEvent::Print(text) => sink.send(OutboundMessage::Print(text)).await,
                                OutboundEvent::Stdout(chunk) => sink.send(OutboundMessage::Stdout(chunk)).await,
                                OutboundEvent::Stderr(chunk) => sink.send(OutboundMessage::Stderr(chunk)).await,
                                OutboundEvent::FileRequest { name, delivery } => {
                                    let result = sink.send(OutboundMessage::FileRequest { name: name.clone() }).await;
                                    if result.is_ok() {
                                        let mut guard = pending_request.lock().unwrap();
                                        *guard = Some(PendingFileRequest { name, delivery });
                                    }
                                    result
                                }
                                OutboundEvent::OutboundFile(job) => {
                                    let data = drain(job.source).await;
                                    sink.send(OutboundMessage::File { name: job.name, size: job.size, data }).await
                                }
                            };
                            if let Err(e) = sent {
                                report_error(&err_tx, e);
                                break;
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }

        // from-client pump: any receive error, including a closed stream,
        // terminates this pump cleanly. It never reports onto `err_rx`.
        {
            let pending_request = pending_request.clone();
            tokio::spawn(async move {
                loop {
                    match source.recv().await {
                        Ok(Some(InboundMessage::Stdin(bytes))) => {
                            let _ = stdin_tx.send(bytes).await;
                        }
                        Ok(Some(InboundMessage::File { name, data, .. })) => {
                            let matched = {
                                let guard = pending_request.lock().unwrap();
                                guard.as_ref().map(|p| p.name == name).unwrap_or(false)
                            };
                            if matched {
                                if let Some(pending) = pending_request.lock().unwrap().take() {
                                    let _ = pending.delivery.send(data);
                                }
                            } else {
                                tracing::warn!(file = %name, "ignoring file chunk with no matching outstanding request");
                            }
                        }
                        Ok(Some(InboundMessage::Command(_))) => {
                            tracing::warn!("ignoring unexpected command envelope mid-session");
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!(error = %e, "from-client stream ended");
                            break;
                        }
                    }
                }
            });
        }

        let handle = Arc::new(SessionHandle { events_tx, stdin_rx: Arc::new(tokio::sync::Mutex::new(stdin_rx)) });

        (handle, err_rx)
    }
}

fn report_error(slot: &Arc<Mutex<Option<oneshot::Sender<TransportError>>>>, err: TransportError) {
    if let Some(tx) = slot.lock().unwrap().take() {
        let _ = tx.send(err);
    }
}

async fn drain(mut source: Box<dyn FileSource + Send>) -> Vec<u8> {
    let mut buf = Vec::new();
    loop {
        match source.read_chunk(64 * 1024).await {
            Ok(chunk) if chunk.is_empty() => break,
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(e) => {
                tracing::warn!(error = %e, "error reading file source for send_file");
                break;
            }
        }
    }
    buf
}
