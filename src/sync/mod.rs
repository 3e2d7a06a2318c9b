pub mod autosave;
pub mod github;

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::occurrence::{self, OccurrenceKey};
use crate::core::task::Task;

/// The payload stored remotely: the whole task collection plus the
/// completion set, stamped at export time. Recurrence rules ride along as
/// plain data, no transformation on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(with = "occurrence::flat_map", default)]
    pub completion_map: BTreeSet<OccurrenceKey>,
    #[serde(default)]
    pub exported_at: NaiveDateTime,
}

/// A remote sync failure. Local state is never rolled back or blocked by
/// one of these; they only surface through status reporting.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store is not configured")]
    NotConfigured,
    #[error("authentication failed; check the access token")]
    Auth,
    #[error("repository not found or not accessible")]
    NotFound,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("malformed remote payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("malformed remote content encoding: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Current sync status, published by the auto-save driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced(String), // formatted timestamp
    Error(String),
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// The narrow interface the core relies on for remote persistence.
///
/// `load` returns `Ok(None)` when no remote state exists yet; `save` must be
/// idempotent and safely retriable.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    fn is_configured(&self) -> bool;
    async fn load(&mut self) -> Result<Option<RemoteState>, SyncError>;
    async fn save(&mut self, state: &RemoteState) -> Result<(), SyncError>;
}
