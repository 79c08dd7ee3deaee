pub mod dispatcher;
pub mod event;
pub mod joystick;
pub mod macros;
pub mod mapper;
pub mod source;
pub mod target;

use thiserror::Error;

use target::OutputError;

/// Possible errors performing a logical action
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("Unknown key name: {0}")]
    InvalidKey(String),
    #[error("No macro registered with name: {0}")]
    MacroNotFound(String),
    #[error("Macro was cancelled")]
    Cancelled,
    #[error("Failed to execute action: {0}")]
    ExecutionFailed(String),
}

impl From<OutputError> for ActionError {
    fn from(err: OutputError) -> Self {
        ActionError::ExecutionFailed(err.to_string())
    }
}
