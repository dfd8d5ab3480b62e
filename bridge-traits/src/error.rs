use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Work scheduling failed: {0}")]
    Scheduling(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            BridgeError::OperationFailed(_) | BridgeError::Io(_) => true,
            BridgeError::NotAvailable(_) | BridgeError::Scheduling(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
