//! # elif-arcade: ArcadeDB client for elif.rs
//!
//! HTTP access to an ArcadeDB server, a transaction coordinator built on
//! server-side sessions and a versioned migration runner.
//!
//! ```ignore
//! use elif_arcade::{Connection, ConnectOptions, MigrationRunner, SqlMigration, StaticRegistry};
//!
//! let ctx = Connection::connect("http://localhost:2480", "cms", ConnectOptions::new().credentials("root", "pw"))?;
//! let registry = StaticRegistry::builder()
//!     .migration(SqlMigration::new(1, "create_article").up_sql("CREATE DOCUMENT TYPE Article").down_sql("DROP TYPE Article"))
//!     .build()?;
//! let applied = MigrationRunner::default().migrate(&ctx, &registry).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod migrations;
pub mod transaction;

pub use config::*;
pub use connection::Connection;
pub use error::*;
pub use executor::{Executor, HttpExecutor, Language, Request, SESSION_HEADER};
pub use migrations::*;
pub use transaction::{
    begin, begin_with, commit, is_retryable, rollback, transaction, transaction_with, IsolationLevel,
    TransactionConfig, TransactionFault,
};
