//! Per-user match list with a browse cursor.
//!
//! The list is stored as JSON under `partners:<user id>` and replaced
//! wholesale by each search. The cursor lives on the profile; this type only
//! interprets it against the current entry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::store::CacheStore;
use crate::error::{CacheError, PaginationError};
use crate::profile::{CandidateSnapshot, UserId};

pub struct MatchCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl MatchCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(user: UserId) -> String {
        format!("partners:{user}")
    }

    /// Store a fresh search result, discarding any previous list.
    pub async fn replace(
        &self,
        user: UserId,
        candidates: &[CandidateSnapshot],
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(candidates)?;
        self.store.set(&Self::key(user), json, self.ttl).await?;
        debug!(user_id = user, count = candidates.len(), "Match list cached");
        Ok(())
    }

    /// The whole live list, or `CacheUnavailable` when absent or expired.
    pub async fn load(&self, user: UserId) -> Result<Vec<CandidateSnapshot>, PaginationError> {
        let Some(json) = self.store.get(&Self::key(user)).await? else {
            return Err(PaginationError::CacheUnavailable);
        };
        serde_json::from_str(&json).map_err(|e| {
            // A corrupt entry is recovered the same way as an expired one.
            warn!(user_id = user, error = %e, "Discarding unreadable match list");
            PaginationError::CacheUnavailable
        })
    }

    /// Candidate under the cursor.
    pub async fn candidate_at(
        &self,
        user: UserId,
        cursor: usize,
    ) -> Result<CandidateSnapshot, PaginationError> {
        let mut list = self.load(user).await?;
        if cursor >= list.len() {
            return Err(PaginationError::NoMoreCandidates);
        }
        Ok(list.swap_remove(cursor))
    }

    /// Cursor after a "next", or `NoMoreCandidates` if the cursor is on the last entry.
    pub async fn next_index(&self, user: UserId, cursor: usize) -> Result<usize, PaginationError> {
        let len = self.load(user).await?.len();
        if cursor + 1 < len {
            Ok(cursor + 1)
        } else {
            Err(PaginationError::NoMoreCandidates)
        }
    }
}
