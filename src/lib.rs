//! qrhunt - campaign and QR-code scavenger hunt administration
//!
//! This library provides the session core: the session entity, its
//! persistence, the lifecycle operations used by authentication and the
//! background sweeper that removes expired sessions.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use error::SessionError;
