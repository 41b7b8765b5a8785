//! Database repositories
//!
//! Repository pattern implementations for session storage.

pub mod memory;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::InMemorySessionRepository;
pub use session::{SessionRepository, SqlxSessionRepository};
