//! Error kinds produced and consumed by the core runtime.
//!
//! Variant names follow the semantic kinds in the error-handling design
//! rather than any particular transport's status codes; `dutctl-transport-grpc`
//! owns the mapping onto `tonic::Status` so this crate never depends on tonic.

/// Per-module location recorded when a module fails to initialise.
#[derive(Debug, Clone)]
pub struct ModuleInitFailure {
    pub device: String,
    pub command: String,
    pub module_id: String,
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    #[error("command '{command}' not found on device '{device}'")]
    CommandNotFound { device: String, command: String },

    #[error("command '{device}/{command}' has no modules")]
    NoModules { device: String, command: String },

    #[error("command '{device}/{command}' has more than one forwarding module")]
    MultipleForwardArgsModules { device: String, command: String },

    #[error("command '{device}/{command}' module '{module_id}': a forwarding module must not declare static args")]
    ForwardingModuleHasStaticArgs { device: String, command: String, module_id: String },

    #[error("unknown module plugin id '{0}'")]
    UnknownModule(String),

    #[error("module '{module}' option validation failed: {reason}")]
    ModuleValidation { module: String, reason: String },

    #[error("module initialisation failed for {} module(s)", failures.len())]
    ModuleInitError { failures: Vec<ModuleInitFailure> },

    #[error("first message on the Run stream was not a command envelope")]
    FirstMessageNotCommand,

    #[error("failed to receive the first message on the Run stream: {0}")]
    StreamRecv(String),

    #[error("session broker I/O error on '{device}/{command}': {message}")]
    BrokerIo { device: String, command: String, message: String },

    #[error("module '{module_id}' failed on '{device}/{command}': {message}")]
    ModuleRun { device: String, command: String, module_id: String, message: String },

    #[error("context cancelled")]
    ContextCancelled,

    #[error("panic recovered on '{device}/{command}' in module '{module_id}': {message}")]
    Panic { device: String, command: String, module_id: String, message: String },
}
