use std::path::PathBuf;

use thiserror::Error;

/// Failures of the persisted live parameter file.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Nothing has been set yet. Not a storage fault.
    #[error("parameter file {} does not exist yet", path.display())]
    Uninitialized { path: PathBuf },

    #[error("could not access parameter file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parameter file {} is not a flat object of numbers and booleans: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, StoreError::Uninitialized { .. })
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("engine not available: {0}")]
    EngineUnavailable(String),

    #[error("engine was launched but did not become ready after {attempts} checks")]
    StartupTimeout { attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("could not resolve connection parameters: {0}")]
    ParameterResolution(String),

    #[error("control channel failure: {0}")]
    ChannelFailure(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl BridgeError {
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::EngineUnavailable(_) => "engine_unavailable",
            BridgeError::StartupTimeout { .. } => "startup_timeout",
            BridgeError::Cancelled => "cancelled",
            BridgeError::ParameterResolution(_) => "parameter_resolution",
            BridgeError::ChannelFailure(_) => "channel_failure",
            BridgeError::Storage(StoreError::Uninitialized { .. }) => "storage_uninitialized",
            BridgeError::Storage(_) => "storage_failure",
            BridgeError::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn next_action(&self) -> &'static str {
        match self {
            BridgeError::EngineUnavailable(_) => "Call initialize to start the engine, then retry.",
            BridgeError::StartupTimeout { .. } => {
                "Wait a few seconds and call reconnect, or restart the engine manually."
            }
            BridgeError::Cancelled => "Retry the call.",
            BridgeError::ParameterResolution(_) => {
                "Wait for the engine to finish starting, then call reconnect."
            }
            BridgeError::ChannelFailure(_) => "Try reconnect.",
            BridgeError::Storage(StoreError::Uninitialized { .. }) => {
                "Set a parameter with update_state to create it."
            }
            BridgeError::Storage(_) => "Check the parameter file path and its permissions.",
            BridgeError::InvalidInput(_) => "Fix the arguments and retry.",
        }
    }

    /// The text a tool hands back to its caller.
    pub fn user_message(&self) -> String {
        format!("Error: {self}. {}", self.next_action())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
