//! gRPC status to [`SecuError`] mapping on the client side.

use secu_common::{ContextKind, SecuError};
use tonic::{Code, Status};

/// Classifies a failed call. Only `UNAVAILABLE` is marked retryable.
pub fn error_from_status(status: &Status, kind: ContextKind, ctx_id: u64) -> SecuError {
    match status.code() {
        Code::NotFound => SecuError::UnknownContext { kind, id: ctx_id },
        Code::InvalidArgument => SecuError::invalid("request", status.message()),
        Code::Internal => SecuError::EngineFailure(status.message().to_string()),
        Code::Unavailable => SecuError::Transport {
            retryable: true,
            message: status.message().to_string(),
        },
        code => SecuError::transport(format!("{:?}: {}", code, status.message())),
    }
}
