//! Document lifecycle transition table
//!
//! ```text
//! PENDING --approve--> APPROVED --confirm--> IMPORTED | EXPORTED | ADJUSTED
//! PENDING --reject---> REJECTED
//! PENDING --cancel---> CANCELLED
//! PENDING --edit-----> PENDING
//! ```
//!
//! Every lifecycle check in the system goes through [`next_status`].

use thiserror::Error;

use crate::models::{DocumentAction, DocumentKind, DocumentStatus};

/// An action was attempted from a status that does not permit it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} {kind} document in status {from}")]
pub struct TransitionError {
    pub kind: DocumentKind,
    pub from: DocumentStatus,
    pub action: DocumentAction,
}

/// Status reached by applying `action` to a `kind` document in status `from`
pub fn next_status(
    kind: DocumentKind,
    from: DocumentStatus,
    action: DocumentAction,
) -> Result<DocumentStatus, TransitionError> {
    use DocumentAction::*;
    use DocumentStatus::*;

    let to = match (from, action) {
        (Pending, Edit) => Some(Pending),
        (Pending, Approve) => Some(Approved),
        (Pending, Reject) => Some(Rejected),
        (Pending, Cancel) => Some(Cancelled),
        (Approved, Confirm) => Some(kind.terminal_status()),
        _ => None,
    };

    to.filter(|_| from.belongs_to(kind))
        .ok_or(TransitionError { kind, from, action })
}

/// Actions currently available for a document
pub fn allowed_actions(kind: DocumentKind, status: DocumentStatus) -> Vec<DocumentAction> {
    DocumentAction::ALL
        .into_iter()
        .filter(|action| next_status(kind, status, *action).is_ok())
        .collect()
}
