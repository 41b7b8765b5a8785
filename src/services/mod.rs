//! Services layer - Business logic
//!
//! This module contains the session business logic:
//! - `SessionService`: the lifecycle operations used by authentication
//! - `CleanupScheduler`: the background sweeper for expired sessions

pub mod cleanup;
pub mod session;

pub use cleanup::{CleanupHandle, CleanupSchedule, CleanupScheduler, CleanupStats};
pub use session::{EndSessionsMode, SessionPolicy, SessionService};
