//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Cache expiry sweep: removes expired entries from the in-process cache
//! - Session cleanup: abandons attempts left in progress past their time limit

mod expiry_sweep;
mod session_cleanup;

pub use expiry_sweep::spawn_expiry_sweep;
pub use session_cleanup::{spawn_session_cleanup, SessionCleanupScheduler, SweepOutcome};
