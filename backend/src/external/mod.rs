//! External API integrations
//!
//! Both directories are display-only: the ledger never fails because a
//! lookup did, callers log and carry on with empty fields.

pub mod identity;
pub mod master_data;

pub use identity::{IdentityClient, IdentityDirectory, UserProfile};
pub use master_data::{MasterDataClient, PartyDirectory, PartyProfile};

/// Comma-separated id list for batch query strings
pub(crate) fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
