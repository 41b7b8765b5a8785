//! Database layer
//!
//! Durable storage for sessions on SQLite (single-binary deployments) or
//! MySQL. The driver is selected from configuration.
//!
//! # Usage
//!
//! ```ignore
//! use qrhunt::config::DatabaseConfig;
//! use qrhunt::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
