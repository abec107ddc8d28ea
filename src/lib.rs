//! English Partner: a Telegram bot that pairs English learners for practice.

pub mod cache;
pub mod channels;
pub mod config;
pub mod error;
pub mod follow;
pub mod matching;
pub mod media;
pub mod profile;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod web;
