use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Remote catalog error: {0}")]
    Remote(String),

    #[error("No signed-in account")]
    NotAuthenticated,

    #[error("Illegal sync transition: {transition} from {from}")]
    IllegalTransition { from: String, transition: String },

    #[error("Failed to schedule background work: {0}")]
    Scheduling(String),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl SyncError {
    /// Whether a background retry of the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Remote(_) | SyncError::Library(_) => true,
            SyncError::Bridge(e) => e.is_transient(),
            SyncError::NotAuthenticated
            | SyncError::IllegalTransition { .. }
            | SyncError::Scheduling(_)
            | SyncError::Auth(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
