use crate::run_control::RunState;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("device {0:?} is already in use by another session")]
    DeviceInUse(String),

    #[error("no adapter session has been started")]
    NoSession,

    #[error("cannot {action} while the session is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("no process to {0}")]
    NoProcess(&'static str),

    #[error("target cannot go from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}
