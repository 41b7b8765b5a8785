//! Data models
//!
//! This module contains the data structures shared across the qrhunt core.
//! Campaigns, QR codes and finds live in the web layer; only the session
//! entity is modelled here.

mod session;

pub use session::{
    lifetime_days, Session, DEFAULT_EXPIRATION_DAYS, EMPTY_SESSION_DATA, MAX_EXPIRATION_DAYS,
};
