//! Migration System
//!
//! Versioned schema changes for a database, applied and rolled back in
//! version order and tracked in a bookkeeping document type.

mod bookkeeping;
pub mod definitions;
pub mod registry;
pub mod runner;
pub mod unit;

pub use definitions::*;
pub use registry::{MigrationRegistry, StaticRegistry, StaticRegistryBuilder};
pub use runner::MigrationRunner;
pub use unit::{Migration, SqlMigration};
