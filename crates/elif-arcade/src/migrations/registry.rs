//! Migration Registry - the declared set of units for one schema

use std::collections::HashSet;
use std::sync::Arc;

use super::unit::Migration;
use crate::error::{ArcadeError, ArcadeResult};

/// Source of the migration units for one schema
///
/// The returned order is the declaration order. It is only used for status
/// display; execution order is always derived from the versions.
pub trait MigrationRegistry: Send + Sync {
    fn migrations(&self) -> Vec<Arc<dyn Migration>>;
}

/// A fixed list of units, checked for unique positive versions at build time
#[derive(Clone, Default)]
pub struct StaticRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl StaticRegistry {
    pub fn new(migrations: Vec<Arc<dyn Migration>>) -> ArcadeResult<Self> {
        let mut seen = HashSet::with_capacity(migrations.len());
        for migration in &migrations {
            let version = migration.version();
            if version <= 0 {
                return Err(ArcadeError::Configuration(format!(
                    "Migration '{}' has non-positive version {}",
                    migration.name(),
                    version
                )));
            }
            if !seen.insert(version) {
                return Err(ArcadeError::Configuration(format!(
                    "Duplicate migration version {} ('{}')",
                    version,
                    migration.name()
                )));
            }
        }

        Ok(Self { migrations })
    }

    pub fn builder() -> StaticRegistryBuilder {
        StaticRegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl MigrationRegistry for StaticRegistry {
    fn migrations(&self) -> Vec<Arc<dyn Migration>> {
        self.migrations.clone()
    }
}

impl std::fmt::Debug for StaticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.migrations.iter().map(|m| (m.version(), m.name().to_string())))
            .finish()
    }
}

/// Collects units in declaration order, validating on [`build`](Self::build)
#[derive(Default)]
pub struct StaticRegistryBuilder {
    migrations: Vec<Arc<dyn Migration>>,
}

impl StaticRegistryBuilder {
    pub fn migration<M: Migration + 'static>(mut self, migration: M) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn shared(mut self, migration: Arc<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn build(self) -> ArcadeResult<StaticRegistry> {
        StaticRegistry::new(self.migrations)
    }
}
