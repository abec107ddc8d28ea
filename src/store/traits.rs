//! Unified `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::profile::{EnglishLevel, GenderFilter, MediaId, UserId, UserProfile};

/// Filtered candidate query.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub english_level: EnglishLevel,
    pub gender: GenderFilter,
    /// Never returned, even if otherwise eligible.
    pub requester: UserId,
    pub exclude: Vec<UserId>,
    pub limit: usize,
}

/// A handshake row between two users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRequest {
    pub requester_id: UserId,
    pub target_id: UserId,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored photo file.
#[derive(Debug, Clone)]
pub struct MediaRecord {
    pub id: MediaId,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering profiles, matching, follow
/// requests, watch records, and media.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, telegram_id: UserId) -> Result<Option<UserProfile>, DatabaseError>;

    /// Fetch a profile, inserting a fresh one on first contact.
    async fn get_or_create_profile(&self, telegram_id: UserId)
    -> Result<UserProfile, DatabaseError>;

    /// Insert or update every mutable field of the profile.
    async fn save_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError>;

    /// Candidates for a partner search, ascending by creation order.
    async fn find_candidates(&self, query: &MatchQuery) -> Result<Vec<UserProfile>, DatabaseError>;

    // ── Watch list ──────────────────────────────────────────────────

    /// Ids the viewer has already been shown.
    async fn watched_ids(&self, viewer: UserId) -> Result<Vec<UserId>, DatabaseError>;

    /// Whether `viewed` was ever shown to `viewer`.
    async fn has_watched(&self, viewer: UserId, viewed: UserId) -> Result<bool, DatabaseError>;

    /// Persist the viewer's profile and append a watch record in one transaction.
    async fn record_view(&self, viewer: &UserProfile, viewed: UserId) -> Result<(), DatabaseError>;

    // ── Follow requests ─────────────────────────────────────────────

    /// Insert a pending request. Returns `false` if one already exists.
    async fn create_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError>;

    /// Flip the pending request to accepted. Returns `false` if none was pending.
    async fn accept_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError>;

    /// Delete the pending request. Returns `false` if none was pending.
    async fn delete_pending_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError>;

    /// Most recent request for the pair, accepted or not.
    async fn get_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Option<FollowRequest>, DatabaseError>;

    // ── Media ───────────────────────────────────────────────────────

    async fn insert_media(&self, file_name: &str) -> Result<MediaId, DatabaseError>;

    async fn get_media(&self, id: MediaId) -> Result<Option<MediaRecord>, DatabaseError>;

    /// Returns `false` if no such record existed.
    async fn delete_media(&self, id: MediaId) -> Result<bool, DatabaseError>;
}
