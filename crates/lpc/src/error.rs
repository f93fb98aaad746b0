use client_core::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LpcError {
    #[error("labware position check is not ready: {0}")]
    NotReady(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("cannot {action} while labware position check is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("labware position check session is closed")]
    SessionClosed,
}
