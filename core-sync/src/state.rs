//! Sync status transitions
//!
//! Pure rules for how a row's [`SyncStatus`] moves as local edits and remote
//! confirmations arrive. Nothing here touches storage.
//!
//! ```text
//!  LOCAL_ONLY ──┐
//!               ├─ PushConfirmed / PulledFromRemote ──> SYNCED ── AbsentFromRemote ──> (removed)
//! PENDING_PUSH ─┘
//!
//!  any ── DeleteRequested ──> PENDING_DELETE ── RemoteDeleteConfirmed ──> (removed)
//! ```
//!
//! Only `SYNCED` rows may be removed for being absent from the remote list.

use crate::error::{Result, SyncError};
use core_library::SyncStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event that moves a row between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncTransition {
    /// The remote catalog accepted an add
    PushConfirmed,
    /// The user removed the entry
    DeleteRequested,
    /// The remote catalog accepted a removal
    RemoteDeleteConfirmed,
    /// Reconciliation did not find the key remotely
    AbsentFromRemote,
    /// Reconciliation found the key remotely
    PulledFromRemote,
}

impl fmt::Display for SyncTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTransition::PushConfirmed => "PushConfirmed",
            SyncTransition::DeleteRequested => "DeleteRequested",
            SyncTransition::RemoteDeleteConfirmed => "RemoteDeleteConfirmed",
            SyncTransition::AbsentFromRemote => "AbsentFromRemote",
            SyncTransition::PulledFromRemote => "PulledFromRemote",
        };
        f.write_str(name)
    }
}

/// Result of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Status(SyncStatus),
    /// The row must be physically deleted
    Removed,
}

/// Status of an entry created by a user toggle.
pub fn initial_status(authenticated: bool) -> SyncStatus {
    if authenticated {
        SyncStatus::PendingPush
    } else {
        SyncStatus::LocalOnly
    }
}

/// Applies `transition` to `status`.
///
/// # Errors
/// [`SyncError::IllegalTransition`] for any pair not listed below.
///
/// | from | transition | to |
/// |------|------------|----|
/// | `LOCAL_ONLY`, `PENDING_PUSH`, `SYNCED` | `PushConfirmed` | `SYNCED` |
/// | any | `DeleteRequested` | `PENDING_DELETE` |
/// | `PENDING_DELETE` | `RemoteDeleteConfirmed` | removed |
/// | `SYNCED` | `AbsentFromRemote` | removed |
/// | any but `PENDING_DELETE` | `PulledFromRemote` | `SYNCED` |
pub fn next(status: SyncStatus, transition: SyncTransition) -> Result<Transition> {
    use SyncStatus::*;
    use SyncTransition::*;

    let outcome = match (status, transition) {
        (LocalOnly | PendingPush | Synced, PushConfirmed) => Some(Transition::Status(Synced)),
        (_, DeleteRequested) => Some(Transition::Status(PendingDelete)),
        (PendingDelete, RemoteDeleteConfirmed) => Some(Transition::Removed),
        (Synced, AbsentFromRemote) => Some(Transition::Removed),
        (LocalOnly | PendingPush | Synced, PulledFromRemote) => Some(Transition::Status(Synced)),
        _ => None,
    };

    outcome.ok_or_else(|| SyncError::IllegalTransition {
        from: status.to_string(),
        transition: transition.to_string(),
    })
}

/// Only synced rows may be removed for being absent remotely.
pub fn is_stale_eligible(status: SyncStatus) -> bool {
    status == SyncStatus::Synced
}

/// Whether observers see the row.
pub fn is_visible(status: SyncStatus) -> bool {
    status != SyncStatus::PendingDelete
}

/// Whether the row still has to be added remotely.
pub fn is_pending_sync(status: SyncStatus) -> bool {
    matches!(status, SyncStatus::LocalOnly | SyncStatus::PendingPush)
}

/// Whether the row belongs to the account and is purged on logout.
pub fn is_removed_on_logout(status: SyncStatus) -> bool {
    matches!(status, SyncStatus::Synced | SyncStatus::PendingPush)
}

#[cfg(test)]
mod tests {
    use super::*;
    use SyncStatus::*;
    use SyncTransition::*;

    #[test]
    fn test_initial_status() {
        assert_eq!(initial_status(true), PendingPush);
        assert_eq!(initial_status(false), LocalOnly);
    }

    #[test]
    fn test_push_confirmation() {
        for status in [LocalOnly, PendingPush, Synced] {
            assert_eq!(next(status, PushConfirmed).unwrap(), Transition::Status(Synced));
        }
        assert!(next(PendingDelete, PushConfirmed).is_err());
    }

    #[test]
    fn test_delete_requested_from_any_status() {
        for status in SyncStatus::ALL {
            assert_eq!(
                next(status, DeleteRequested).unwrap(),
                Transition::Status(PendingDelete)
            );
        }
    }

    #[test]
    fn test_removal_paths() {
        assert_eq!(next(PendingDelete, RemoteDeleteConfirmed).unwrap(), Transition::Removed);
        assert_eq!(next(Synced, AbsentFromRemote).unwrap(), Transition::Removed);
        assert!(next(Synced, RemoteDeleteConfirmed).is_err());
    }

    #[test]
    fn test_only_synced_rows_can_go_stale() {
        for status in [LocalOnly, PendingPush, PendingDelete] {
            assert!(matches!(
                next(status, AbsentFromRemote),
                Err(SyncError::IllegalTransition { .. })
            ));
            assert!(!is_stale_eligible(status));
        }
        assert!(is_stale_eligible(Synced));
    }

    #[test]
    fn test_pull_never_resurrects_pending_delete() {
        assert!(next(PendingDelete, PulledFromRemote).is_err());
        assert_eq!(next(LocalOnly, PulledFromRemote).unwrap(), Transition::Status(Synced));
    }

    #[test]
    fn test_predicates() {
        assert!(!is_visible(PendingDelete));
        assert!(is_visible(LocalOnly));
        assert!(is_pending_sync(LocalOnly) && is_pending_sync(PendingPush));
        assert!(!is_pending_sync(Synced));
        assert!(is_removed_on_logout(Synced) && is_removed_on_logout(PendingPush));
        assert!(!is_removed_on_logout(LocalOnly) && !is_removed_on_logout(PendingDelete));
    }
}
