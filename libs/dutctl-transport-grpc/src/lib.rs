//! gRPC transport for the dutctl agent: the generated `Agent` service stubs
//! plus the `tonic`-specific glue that adapts them onto `dutctl-core`'s
//! transport-agnostic FSM and Session Broker.
//!
//! This crate is the only place in the workspace that depends on `tonic`;
//! `dutctl-core` never does.

mod adapters;
mod error;
mod service;
mod wire;

/// Generated protobuf types and gRPC client/server stubs for the `Agent`
/// service.
pub mod pb {
    tonic::include_proto!("dutctl.v1");
}

pub use adapters::{GrpcInboundSource, GrpcOutboundSink};
pub use service::{AgentService, RunResponseStream};

pub use pb::agent_server::AgentServer;
