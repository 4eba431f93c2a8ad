//! Core runtime for the dutctl agent: the Device/Command Registry (C1), the
//! Module Plugin Registry (C2), the `Module`/`Session` contracts (C3/C4),
//! the Session Broker (C5), the Command Execution FSM (C6), the Argument
//! Router (C7), and the Lifecycle Orchestrator (C8).
//!
//! This crate is transport-agnostic: it knows nothing about gRPC. Transports
//! talk to it through [`session::broker::OutboundSink`] /
//! [`session::broker::InboundSource`] and [`fsm::CommandFsm`].

pub mod argrouter;
pub mod contracts;
pub mod error;
pub mod fsm;
pub mod lifecycle;
pub mod plugin;
pub mod registry;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-exported so `register_module!` can refer to `$crate::inventory` without
// every module crate also depending on `inventory` directly.
#[doc(hidden)]
pub use inventory;
