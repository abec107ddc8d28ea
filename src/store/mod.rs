//! Persistence layer: libSQL-backed storage for profiles, follow requests,
//! watch records, and media.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, FollowRequest, MatchQuery, MediaRecord};
