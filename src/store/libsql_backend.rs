//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::profile::{
    EditField, EnglishLevel, FindPartnerStep, Gender, GenderFilter, MediaId, OnboardingStep,
    UserId, UserProfile,
};
use crate::store::migrations;
use crate::store::traits::{Database, FollowRequest, MatchQuery, MediaRecord};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Every
/// statement passes through `gate`, so an open transaction on the shared
/// connection is never interleaved with another caller's reads or writes.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    gate: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            gate: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

/// Column order for `row_to_profile`.
const PROFILE_COLUMNS: &str = "telegram_id, username, name, mobile_number, english_level, gender, photo_id, onboarding, editing, find_partner, last_english_filter, last_gender_filter, view_window_start, views_in_window, browse_cursor, created_at, updated_at";

/// Map a libsql Row to a UserProfile.
///
/// Unparseable enum columns decode to `None` or the idle default rather
/// than failing the whole row.
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    let english_level: Option<String> = row.get(4).ok();
    let gender: Option<String> = row.get(5).ok();
    let photo_id: Option<i64> = row.get(6).ok();
    let onboarding: String = row.get(7)?;
    let editing: String = row.get(8)?;
    let find_partner: String = row.get(9)?;
    let last_english_filter: Option<String> = row.get(10).ok();
    let last_gender_filter: Option<String> = row.get(11).ok();
    let view_window_start: Option<String> = row.get(12).ok();
    let views_in_window: i64 = row.get(13)?;
    let browse_cursor: i64 = row.get(14)?;
    let created_str: String = row.get(15)?;
    let updated_str: String = row.get(16)?;

    Ok(UserProfile {
        telegram_id: row.get(0)?,
        username: row.get(1).ok(),
        name: row.get(2)?,
        mobile_number: row.get::<String>(3).ok().filter(|m| !m.is_empty()),
        english_level: english_level.and_then(|s| s.parse::<EnglishLevel>().ok()),
        gender: gender.and_then(|s| s.parse::<Gender>().ok()),
        photo: photo_id.filter(|id| *id > 0).map(MediaId),
        onboarding: OnboardingStep::from_db(&onboarding),
        editing: EditField::from_db(&editing),
        find_partner: FindPartnerStep::from_db(&find_partner),
        last_english_filter: last_english_filter.and_then(|s| s.parse::<EnglishLevel>().ok()),
        last_gender_filter: last_gender_filter.and_then(|s| s.parse::<GenderFilter>().ok()),
        view_window_start: parse_optional_datetime(&view_window_start),
        views_in_window: u32::try_from(views_in_window).unwrap_or(0),
        browse_cursor: usize::try_from(browse_cursor).unwrap_or(0),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_follow_request(row: &libsql::Row) -> Result<FollowRequest, libsql::Error> {
    let accepted: i64 = row.get(2)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    Ok(FollowRequest {
        requester_id: row.get(0)?,
        target_id: row.get(1)?,
        accepted: accepted != 0,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Insert-or-update a profile on any connection (plain or transactional).
async fn upsert_profile(conn: &Connection, profile: &UserProfile) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        &format!(
            "INSERT INTO users ({PROFILE_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
             ON CONFLICT(telegram_id) DO UPDATE SET \
                username = excluded.username, \
                name = excluded.name, \
                mobile_number = excluded.mobile_number, \
                english_level = excluded.english_level, \
                gender = excluded.gender, \
                photo_id = excluded.photo_id, \
                onboarding = excluded.onboarding, \
                editing = excluded.editing, \
                find_partner = excluded.find_partner, \
                last_english_filter = excluded.last_english_filter, \
                last_gender_filter = excluded.last_gender_filter, \
                view_window_start = excluded.view_window_start, \
                views_in_window = excluded.views_in_window, \
                browse_cursor = excluded.browse_cursor, \
                updated_at = excluded.updated_at"
        ),
        params![
            profile.telegram_id,
            profile.username.clone(),
            profile.name.as_str(),
            profile.mobile_number.clone(),
            profile.english_level.map(|l| l.as_str()),
            profile.gender.map(|g| g.as_str()),
            profile.photo.map(|m| m.0),
            profile.onboarding.as_str(),
            profile.editing.as_str(),
            profile.find_partner.as_str(),
            profile.last_english_filter.map(|l| l.as_str()),
            profile.last_gender_filter.map(|g| g.as_str()),
            profile.view_window_start.map(|t| t.to_rfc3339()),
            i64::from(profile.views_in_window),
            profile.browse_cursor as i64,
            profile.created_at.to_rfc3339(),
            now,
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("save_profile: {e}")))?;
    Ok(())
}

// ── Trait implementation ────────────────────────────────────────────

const FOLLOW_COLUMNS: &str = "requester_id, target_id, accepted, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let _gate = self.gate.lock().await;
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, telegram_id: UserId) -> Result<Option<UserProfile>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM users WHERE telegram_id = ?1"),
                params![telegram_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_profile row parse: {e}")))?;
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn get_or_create_profile(
        &self,
        telegram_id: UserId,
    ) -> Result<UserProfile, DatabaseError> {
        {
            let _gate = self.gate.lock().await;
            let now = Utc::now().to_rfc3339();
            let inserted = self
                .conn()
                .execute(
                    "INSERT OR IGNORE INTO users (telegram_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    params![telegram_id, now],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("get_or_create_profile: {e}")))?;
            if inserted > 0 {
                info!(user_id = telegram_id, "Profile created");
            }
        }

        self.get_profile(telegram_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: telegram_id.to_string(),
            })
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<(), DatabaseError> {
        let _gate = self.gate.lock().await;
        upsert_profile(self.conn(), profile).await?;
        debug!(
            user_id = profile.telegram_id,
            onboarding = %profile.onboarding,
            editing = %profile.editing,
            find_partner = %profile.find_partner,
            "Profile saved"
        );
        Ok(())
    }

    async fn find_candidates(&self, query: &MatchQuery) -> Result<Vec<UserProfile>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut values: Vec<libsql::Value> = vec![
            libsql::Value::Text(query.english_level.as_str().to_string()),
            libsql::Value::Integer(query.requester),
        ];
        let mut sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE english_level = ?1 AND telegram_id != ?2"
        );

        if let Some(gender) = query.gender.gender() {
            values.push(libsql::Value::Text(gender.as_str().to_string()));
            sql.push_str(&format!(" AND gender = ?{}", values.len()));
        }

        if !query.exclude.is_empty() {
            let first = values.len() + 1;
            let placeholders: Vec<String> = (0..query.exclude.len())
                .map(|i| format!("?{}", first + i))
                .collect();
            values.extend(query.exclude.iter().map(|id| libsql::Value::Integer(*id)));
            sql.push_str(&format!(" AND telegram_id NOT IN ({})", placeholders.join(", ")));
        }

        values.push(libsql::Value::Integer(query.limit as i64));
        sql.push_str(&format!(" ORDER BY id ASC LIMIT ?{}", values.len()));

        let mut rows = self
            .conn()
            .query(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("find_candidates: {e}")))?;

        let mut candidates = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_candidates row: {e}")))?
        {
            candidates.push(
                row_to_profile(&row)
                    .map_err(|e| DatabaseError::Query(format!("find_candidates row parse: {e}")))?,
            );
        }
        debug!(
            user_id = query.requester,
            excluded = query.exclude.len(),
            count = candidates.len(),
            "Candidates queried"
        );
        Ok(candidates)
    }

    // ── Watch list ──────────────────────────────────────────────────

    async fn watched_ids(&self, viewer: UserId) -> Result<Vec<UserId>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn()
            .query(
                "SELECT DISTINCT viewed_id FROM watch_list WHERE viewer_id = ?1",
                params![viewer],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("watched_ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("watched_ids row: {e}")))?
        {
            ids.push(
                row.get::<i64>(0)
                    .map_err(|e| DatabaseError::Query(format!("watched_ids row parse: {e}")))?,
            );
        }
        Ok(ids)
    }

    async fn has_watched(&self, viewer: UserId, viewed: UserId) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM watch_list WHERE viewer_id = ?1 AND viewed_id = ?2 LIMIT 1",
                params![viewer, viewed],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("has_watched: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("has_watched row: {e}")))?;
        Ok(row.is_some())
    }

    async fn record_view(&self, viewer: &UserProfile, viewed: UserId) -> Result<(), DatabaseError> {
        let _gate = self.gate.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_view begin: {e}")))?;

        upsert_profile(&tx, viewer).await?;
        tx.execute(
            "INSERT INTO watch_list (viewer_id, viewed_id, created_at) VALUES (?1, ?2, ?3)",
            params![viewer.telegram_id, viewed, Utc::now().to_rfc3339()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("record_view watch: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("record_view commit: {e}")))?;

        debug!(
            user_id = viewer.telegram_id,
            viewed_id = viewed,
            views = viewer.views_in_window,
            "View recorded"
        );
        Ok(())
    }

    // ── Follow requests ─────────────────────────────────────────────

    async fn create_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO follow_requests (requester_id, target_id, accepted, created_at, updated_at) \
                 VALUES (?1, ?2, 0, ?3, ?3)",
                params![requester, target, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_follow_request: {e}")))?;
        Ok(count > 0)
    }

    async fn accept_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let now = Utc::now().to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE follow_requests SET accepted = 1, updated_at = ?1 \
                 WHERE requester_id = ?2 AND target_id = ?3 AND accepted = 0",
                params![now, requester, target],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("accept_follow_request: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_pending_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let count = self
            .conn()
            .execute(
                "DELETE FROM follow_requests WHERE requester_id = ?1 AND target_id = ?2 AND accepted = 0",
                params![requester, target],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_pending_follow_request: {e}")))?;
        Ok(count > 0)
    }

    async fn get_follow_request(
        &self,
        requester: UserId,
        target: UserId,
    ) -> Result<Option<FollowRequest>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {FOLLOW_COLUMNS} FROM follow_requests \
                     WHERE requester_id = ?1 AND target_id = ?2 ORDER BY id DESC LIMIT 1"
                ),
                params![requester, target],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_follow_request: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_follow_request(&row).map_err(|e| {
                DatabaseError::Query(format!("get_follow_request row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_follow_request: {e}"))),
        }
    }

    // ── Media ───────────────────────────────────────────────────────

    async fn insert_media(&self, file_name: &str) -> Result<MediaId, DatabaseError> {
        let _gate = self.gate.lock().await;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO media (file_name, created_at) VALUES (?1, ?2)",
            params![file_name, Utc::now().to_rfc3339()],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_media: {e}")))?;
        let id = MediaId(conn.last_insert_rowid());
        debug!(media_id = %id, file_name, "Media record inserted");
        Ok(id)
    }

    async fn get_media(&self, id: MediaId) -> Result<Option<MediaRecord>, DatabaseError> {
        let _gate = self.gate.lock().await;
        let mut rows = self
            .conn()
            .query(
                "SELECT id, file_name, created_at FROM media WHERE id = ?1",
                params![id.0],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_media: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let parse = |e: libsql::Error| DatabaseError::Query(format!("get_media row parse: {e}"));
                let created_str: String = row.get(2).map_err(parse)?;
                Ok(Some(MediaRecord {
                    id: MediaId(row.get(0).map_err(parse)?),
                    file_name: row.get(1).map_err(parse)?,
                    created_at: parse_datetime(&created_str),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_media: {e}"))),
        }
    }

    async fn delete_media(&self, id: MediaId) -> Result<bool, DatabaseError> {
        let _gate = self.gate.lock().await;
        let count = self
            .conn()
            .execute("DELETE FROM media WHERE id = ?1", params![id.0])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_media: {e}")))?;
        Ok(count > 0)
    }
}
