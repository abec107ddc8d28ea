//! Matching engine: filtered candidate search excluding already-seen users.

use std::sync::Arc;

use tracing::info;

use crate::error::DatabaseError;
use crate::profile::{CandidateSnapshot, EnglishLevel, GenderFilter, UserId};
use crate::store::{Database, MatchQuery};

pub struct MatchingEngine {
    db: Arc<dyn Database>,
    limit: usize,
}

impl MatchingEngine {
    pub fn new(db: Arc<dyn Database>, limit: usize) -> Self {
        Self { db, limit }
    }

    /// Up to `limit` candidates at exactly `level` whose gender passes
    /// `gender`, never the requester and never anyone the requester has
    /// already been shown. Ordered by creation; an empty result is not an error.
    pub async fn find(
        &self,
        requester: UserId,
        level: EnglishLevel,
        gender: GenderFilter,
    ) -> Result<Vec<CandidateSnapshot>, DatabaseError> {
        let exclude = self.db.watched_ids(requester).await?;
        let query = MatchQuery {
            english_level: level,
            gender,
            requester,
            exclude,
            limit: self.limit,
        };

        let candidates: Vec<CandidateSnapshot> = self
            .db
            .find_candidates(&query)
            .await?
            .iter()
            .map(|p| p.to_candidate())
            .collect();

        info!(
            user_id = requester,
            level = %level,
            gender = %gender,
            excluded = query.exclude.len(),
            count = candidates.len(),
            "Partner search finished"
        );
        Ok(candidates)
    }
}
