//! Exam Sessions - timed exam attempts backed by a pluggable answer cache
//!
//! Answers are buffered in a cache (in-process or Redis) while an attempt is
//! in progress, scored once on submission, and swept up by a background
//! scheduler when abandoned.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod exam;
pub mod models;
pub mod storage;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{Cache, CacheStore};
pub use config::Config;
pub use exam::ExamSessionManager;
pub use storage::InMemoryExamStore;
pub use tasks::{spawn_session_cleanup, SessionCleanupScheduler};
