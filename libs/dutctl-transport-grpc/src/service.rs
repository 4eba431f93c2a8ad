//! The tonic `Agent` service: the sole boundary where an RPC becomes either
//! a trivial registry lookup (`List`, `Commands`) or a full FSM-driven
//! invocation (`Run`).

use std::pin::Pin;
use std::sync::Arc;

use dutctl_core::fsm::CommandFsm;
use dutctl_core::registry::DeviceRegistry;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

use crate::adapters::{GrpcInboundSource, GrpcOutboundSink};
use crate::error::core_error_to_status;
use crate::pb;

/// Bounds the server->client channel backing one `Run` RPC. The broker's
/// own queues are the real backpressure point; this is only large enough
/// that `tonic`'s stream draining doesn't itself become a second
/// bottleneck.
const OUTBOUND_CHANNEL_CAPACITY: usize = 8;

pub struct AgentService {
    registry: Arc<DeviceRegistry>,
    fsm: Arc<CommandFsm>,
}

impl AgentService {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        let fsm = Arc::new(CommandFsm::new(registry.clone()));
        Self { registry, fsm }
    }
}

pub type RunResponseStream = Pin<Box<dyn Stream<Item = Result<pb::ServerMessage, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl pb::agent_server::Agent for AgentService {
    async fn list(&self, _request: Request<pb::ListRequest>) -> Result<Response<pb::ListResponse>, Status> {
        Ok(Response::new(pb::ListResponse { names: self.registry.names() }))
    }

    async fn commands(&self, request: Request<pb::CommandsRequest>) -> Result<Response<pb::CommandsResponse>, Status> {
        let device = request.into_inner().device;
        let names = self.registry.cmd_names(&device).map_err(core_error_to_status)?;
        Ok(Response::new(pb::CommandsResponse { names }))
    }

    type RunStream = RunResponseStream;

    async fn run(&self, request: Request<Streaming<pb::ClientMessage>>) -> Result<Response<Self::RunStream>, Status> {
        let inbound = Box::new(GrpcInboundSource::new(request.into_inner()));
        let (out_tx, out_rx) = mpsc::channel::<Result<pb::ServerMessage, Status>>(OUTBOUND_CHANNEL_CAPACITY);
        let sink: Arc<GrpcOutboundSink> = Arc::new(GrpcOutboundSink::new(out_tx.clone()));

        let fsm = self.fsm.clone();
        let cancel = tokio_util::sync::CancellationToken::new();
        let cancel_for_task = cancel.clone();

        tokio::spawn(async move {
            let result = tokio::spawn(async move { fsm.run(inbound, sink, cancel_for_task).await }).await;
            let outcome = match result {
                Ok(Ok(())) => None,
                Ok(Err(core_err)) => {
                    tracing::warn!(error = %core_err, "Run RPC ended with an error");
                    Some(core_error_to_status(core_err))
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "Run RPC panicked");
                    Some(Status::internal(format!("panic recovered: {join_err}")))
                }
            };
            if let Some(status) = outcome {
                // The client may already have dropped its receiver if it hung
                // up first; that's not itself an error worth logging.
                let _ = out_tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(out_rx))))
    }
}
