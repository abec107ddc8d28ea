//! Match-list caching: a TTL key/value store and the pagination built on it.

pub mod pagination;
pub mod store;

pub use pagination::MatchCache;
pub use store::{CacheStore, MemoryCache};
