//! The Command Execution FSM (C6): `receiveCommand -> findDUTCmd ->
//! executeModules -> waitModules`, driving one `Run` invocation end to end.
//! States are plain control flow over values, not a class hierarchy, per
//! the broader design: there is nothing here a caller could observe as a
//! distinct "state" object, only the one outcome `run` returns.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::argrouter::route_arguments;
use crate::contracts::RunCtx;
use crate::error::CoreError;
use crate::registry::DeviceRegistry;
use crate::session::broker::{InboundMessage, InboundSource, OutboundSink, SessionBroker};
use crate::session::Session;

enum ModuleFailure {
    Error { module_id: String, message: String },
    Panic { module_id: String, message: String },
}

/// Drives command executions against a fixed [`DeviceRegistry`].
pub struct CommandFsm {
    registry: Arc<DeviceRegistry>,
}

impl CommandFsm {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Runs one `Run` RPC to completion: blocks for the first inbound
    /// message, resolves it to a command, executes that command's module
    /// sequence, and waits for both the modules and the broker to finish.
    ///
    /// `rpc_cancel` is cancelled by the caller when the RPC itself is torn
    /// down (client disconnect, server shutdown); a child of it scopes the
    /// broker and module sequence so that cancelling the parent always
    /// unblocks everything below it.
    pub async fn run(
        &self,
        mut source: Box<dyn InboundSource>,
        sink: Arc<dyn OutboundSink>,
        rpc_cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        // receiveCommand
        let envelope = match source.recv().await {
            Ok(Some(InboundMessage::Command(envelope))) => envelope,
            Ok(Some(_)) => return Err(CoreError::FirstMessageNotCommand),
            Ok(None) => return Err(CoreError::StreamRecv("stream closed before the first message".into())),
            Err(e) => return Err(CoreError::StreamRecv(e.to_string())),
        };

        // findDUTCmd
        let cmd = self.registry.find_cmd(&envelope.device, &envelope.command)?;

        // executeModules
        let mod_ctx = rpc_cancel.child_token();
        let (session, mut broker_err_rx) = SessionBroker::start(mod_ctx.clone(), sink, source);
        let arg_vectors = route_arguments(&cmd, &envelope.args);
        let (module_err_tx, mut module_err_rx) = oneshot::channel::<ModuleFailure>();

        {
            let modules = cmd.modules.clone();
            let mod_ctx_task = mod_ctx.clone();
            let run_ctx = RunCtx::new(rpc_cancel.clone());
            let session: Arc<dyn Session> = session;
            tokio::spawn(async move {
                let total = modules.len();
                for (i, binding) in modules.into_iter().enumerate() {
                    if mod_ctx_task.is_cancelled() {
                        tracing::info!(ran = i, total, "module sequence stopped early: context cancelled");
                        return;
                    }
                    let args = arg_vectors.get(i).cloned().unwrap_or_default();
                    let run_ctx = run_ctx.clone();
                    let session = session.clone();
                    let module_id = binding.config.module_id.clone();
                    // Run each module step on its own task so a panicking
                    // plugin surfaces as a JoinError instead of taking the
                    // whole FSM down with it.
                    let joined = tokio::spawn(async move { binding.module.run(run_ctx, session, args).await }).await;
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            let _ = module_err_tx.send(ModuleFailure::Error { module_id, message: e.to_string() });
                            mod_ctx_task.cancel();
                            return;
                        }
                        Err(join_err) => {
                            let _ = module_err_tx.send(ModuleFailure::Panic { module_id, message: join_err.to_string() });
                            mod_ctx_task.cancel();
                            return;
                        }
                    }
                }
                mod_ctx_task.cancel();
            });
        }

        // waitModules
        let mut module_done = false;
        let mut broker_done = false;
        loop {
            if module_done && broker_done {
                return Ok(());
            }
            tokio::select! {
                biased;

                res = &mut module_err_rx, if !module_done => {
                    module_done = true;
                    match res {
                        Ok(ModuleFailure::Error { module_id, message }) => {
                            return Err(CoreError::ModuleRun {
                                device: envelope.device.clone(),
                                command: envelope.command.clone(),
                                module_id,
                                message,
                            });
                        }
                        Ok(ModuleFailure::Panic { module_id, message }) => {
                            return Err(CoreError::Panic {
                                device: envelope.device.clone(),
                                command: envelope.command.clone(),
                                module_id,
                                message,
                            });
                        }
                        Err(_) => {}
                    }
                }
                res = &mut broker_err_rx, if !broker_done => {
                    broker_done = true;
                    if let Ok(err) = res {
                        return Err(CoreError::BrokerIo {
                            device: envelope.device.clone(),
                            command: envelope.command.clone(),
                            message: err.to_string(),
                        });
                    }
                }
                _ = rpc_cancel.cancelled() => {
                    return Err(CoreError::ContextCancelled);
                }
            }
        }
    }
}
