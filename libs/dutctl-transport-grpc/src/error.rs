//! `CoreError` -> `tonic::Status` mapping. The core crate never depends on
//! `tonic`, so this conversion lives here instead of on `CoreError` itself.

use dutctl_core::error::CoreError;
use tonic::{Code, Status};

pub(crate) fn core_error_to_status(err: CoreError) -> Status {
    let code = match &err {
        CoreError::DeviceNotFound(_) => Code::InvalidArgument,
        CoreError::CommandNotFound { .. } => Code::InvalidArgument,
        CoreError::NoModules { .. } => Code::Internal,
        CoreError::MultipleForwardArgsModules { .. } => Code::Internal,
        CoreError::ForwardingModuleHasStaticArgs { .. } => Code::Internal,
        CoreError::UnknownModule(_) => Code::Internal,
        CoreError::ModuleValidation { .. } => Code::Internal,
        CoreError::ModuleInitError { .. } => Code::Internal,
        CoreError::FirstMessageNotCommand => Code::InvalidArgument,
        CoreError::StreamRecv(_) => Code::Aborted,
        CoreError::BrokerIo { .. } => Code::Internal,
        CoreError::ModuleRun { .. } => Code::Aborted,
        CoreError::ContextCancelled => Code::Aborted,
        CoreError::Panic { .. } => Code::Internal,
    };
    Status::new(code, err.to_string())
}
