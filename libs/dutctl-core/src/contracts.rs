//! The two contracts every module author and every transport implementor
//! code against: [`Module`] (C3) and [`crate::session::Session`] (C4).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::session::Session;

/// The RPC-scoped cancellation handle passed into every [`Module::run`] call.
///
/// Cancelling the underlying token signals that the client went away or the
/// server is shutting down; modules are expected to poll
/// [`RunCtx::is_cancelled`] at reasonable intervals or race
/// [`RunCtx::cancelled`] against their own I/O.
#[derive(Clone)]
pub struct RunCtx {
    cancel: CancellationToken,
}

impl RunCtx {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// A plugin implementing one step of a command's module sequence (C3).
///
/// Instances are shared: the same `Arc<dyn Module>` may appear in more than
/// one command binding, in which case `init`/`deinit` run exactly once for
/// that instance (see [`crate::lifecycle`]) while `run` is invoked once per
/// binding occurrence.
#[async_trait]
pub trait Module: Send + Sync {
    /// Short, human-readable usage text. Never fails; modules with nothing
    /// interesting to say return an empty string.
    fn help(&self) -> String;

    /// Called once per process lifetime before the module ever executes.
    async fn init(&self) -> anyhow::Result<()>;

    /// Called once per process lifetime at shutdown, even for modules whose
    /// `init` failed.
    async fn deinit(&self) -> anyhow::Result<()>;

    /// Executes this module's step of a command. `args` is this module's
    /// slice of the routed runtime arguments (see [`crate::argrouter`]).
    async fn run(&self, ctx: RunCtx, session: Arc<dyn Session>, args: Vec<String>) -> anyhow::Result<()>;
}
