//! Migration Runner - Executes migrations against the database
//!
//! Tracks applied units in the bookkeeping type, computes what is pending
//! and runs units one at a time in version order. The runner holds no state
//! between calls; the bookkeeping rows are the only record of progress.
//!
//! Each unit's procedure and its bookkeeping write are two separate
//! requests. A crash between them leaves the rows out of step with the
//! schema, and two runners working on the same database are not fenced
//! from each other.
//!
//! A panicking unit is reported as a failure only when panics unwind.

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::bookkeeping::Bookkeeping;
use super::definitions::{
    MigrationConfig, MigrationDirection, MigrationRecord, MigrationStatus, MigrationStatusEntry,
};
use super::registry::MigrationRegistry;
use super::unit::Migration;
use crate::connection::Connection;
use crate::error::{ArcadeError, ArcadeResult, RunError};
use crate::transaction::panic_message;

/// Migration runner that executes migrations against a database
#[derive(Clone, Default)]
pub struct MigrationRunner {
    config: MigrationConfig,
    default_registry: Option<Arc<dyn MigrationRegistry>>,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            default_registry: None,
        }
    }

    /// Registry used by the `*_default` operations
    pub fn with_default_registry(mut self, registry: Arc<dyn MigrationRegistry>) -> Self {
        self.default_registry = Some(registry);
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// The configured default registry
    pub fn default_registry(&self) -> ArcadeResult<Arc<dyn MigrationRegistry>> {
        self.default_registry.clone().ok_or_else(|| {
            ArcadeError::Configuration("No default migration registry configured".to_string())
        })
    }

    fn bookkeeping(&self) -> ArcadeResult<Bookkeeping<'_>> {
        self.config.validate()?;
        Ok(Bookkeeping::new(&self.config.bookkeeping_type))
    }

    /// Create the bookkeeping type, its properties and the unique version index
    ///
    /// Once the index exists this only issues the check query. A schema left
    /// half-built by an earlier failure is completed on the next call.
    pub async fn ensure_bookkeeping(&self, ctx: &Connection) -> ArcadeResult<()> {
        let bookkeeping = self.bookkeeping()?;
        if bookkeeping.is_complete(ctx).await? {
            debug!(type_name = %self.config.bookkeeping_type, "Bookkeeping type present");
            return Ok(());
        }

        info!(type_name = %self.config.bookkeeping_type, "Creating migration bookkeeping type");
        bookkeeping.create(ctx).await
    }

    /// Versions recorded as applied, ascending
    pub async fn applied_versions(&self, ctx: &Connection) -> ArcadeResult<Vec<i64>> {
        let records = self.applied_records(ctx).await?;
        Ok(records.into_iter().map(|record| record.version).collect())
    }

    /// Bookkeeping rows, ascending by version
    pub async fn applied_records(&self, ctx: &Connection) -> ArcadeResult<Vec<MigrationRecord>> {
        self.bookkeeping()?.records(ctx).await
    }

    /// Units not yet applied, ascending by version
    pub fn pending(registry: &dyn MigrationRegistry, applied: &[i64]) -> Vec<Arc<dyn Migration>> {
        let applied: HashSet<i64> = applied.iter().copied().collect();
        let mut pending: Vec<_> = registry
            .migrations()
            .into_iter()
            .filter(|unit| !applied.contains(&unit.version()))
            .collect();
        pending.sort_by_key(|unit| unit.version());
        pending
    }

    /// The `n` most recently applied units, descending by version
    pub fn rollback_candidates(
        registry: &dyn MigrationRegistry,
        applied: &[i64],
        n: usize,
    ) -> Vec<Arc<dyn Migration>> {
        let applied: HashSet<i64> = applied.iter().copied().collect();
        let mut candidates: Vec<_> = registry
            .migrations()
            .into_iter()
            .filter(|unit| applied.contains(&unit.version()))
            .collect();
        candidates.sort_by_key(|unit| std::cmp::Reverse(unit.version()));
        candidates.truncate(n);
        candidates
    }

    /// Run a single unit and update bookkeeping
    ///
    /// Every failure, including an invalid bookkeeping configuration, comes
    /// back as [`ArcadeError::MigrationFailure`] for `Up` and
    /// [`ArcadeError::RollbackFailure`] for `Down`. Panics in the unit are
    /// caught and reported the same way.
    pub async fn run_one(
        &self,
        ctx: &Connection,
        unit: &dyn Migration,
        direction: MigrationDirection,
    ) -> ArcadeResult<()> {
        let version = unit.version();
        let wrap = |cause: ArcadeError| match direction {
            MigrationDirection::Up => ArcadeError::migration_failure(version, cause),
            MigrationDirection::Down => ArcadeError::rollback_failure(version, cause),
        };

        let bookkeeping = self.bookkeeping().map_err(&wrap)?;
        let step = match direction {
            MigrationDirection::Up => unit.up(ctx),
            MigrationDirection::Down => unit.down(ctx),
        };

        match AssertUnwindSafe(step).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(wrap(e)),
            Err(panic) => return Err(wrap(ArcadeError::Panicked(panic_message(panic.as_ref())))),
        }

        let recorded = match direction {
            MigrationDirection::Up => bookkeeping.insert(ctx, version, unit.name()).await,
            MigrationDirection::Down => bookkeeping.delete(ctx, version).await,
        };
        recorded.map_err(wrap)
    }

    /// Apply every pending unit in ascending version order
    ///
    /// Stops at the first failure; the returned [`RunError`] carries how many
    /// units were applied before it. Later units stay pending.
    pub async fn migrate(
        &self,
        ctx: &Connection,
        registry: &dyn MigrationRegistry,
    ) -> Result<usize, RunError> {
        self.ensure_bookkeeping(ctx).await.map_err(|e| RunError::new(0, e))?;
        let applied = self.applied_versions(ctx).await.map_err(|e| RunError::new(0, e))?;

        let pending = Self::pending(registry, &applied);
        if pending.is_empty() {
            info!(database = ctx.database(), "No pending migrations");
            return Ok(0);
        }

        self.run_sequence(ctx, pending, MigrationDirection::Up).await
    }

    /// Roll back the `n` most recently applied units in descending version order
    pub async fn rollback(
        &self,
        ctx: &Connection,
        registry: &dyn MigrationRegistry,
        n: usize,
    ) -> Result<usize, RunError> {
        self.ensure_bookkeeping(ctx).await.map_err(|e| RunError::new(0, e))?;
        let applied = self.applied_versions(ctx).await.map_err(|e| RunError::new(0, e))?;

        let candidates = Self::rollback_candidates(registry, &applied, n);
        if candidates.is_empty() {
            info!(database = ctx.database(), "No migrations to roll back");
            return Ok(0);
        }

        self.run_sequence(ctx, candidates, MigrationDirection::Down).await
    }

    /// Applied/pending state of every unit, in registry declaration order
    ///
    /// Read only: on a database without the bookkeeping type every unit is
    /// pending and nothing is created.
    pub async fn status(
        &self,
        ctx: &Connection,
        registry: &dyn MigrationRegistry,
    ) -> ArcadeResult<Vec<MigrationStatusEntry>> {
        let bookkeeping = self.bookkeeping()?;
        let applied: HashSet<i64> = if bookkeeping.type_exists(ctx).await? {
            bookkeeping
                .records(ctx)
                .await?
                .into_iter()
                .map(|record| record.version)
                .collect()
        } else {
            HashSet::new()
        };

        Ok(registry
            .migrations()
            .iter()
            .map(|unit| MigrationStatusEntry {
                version: unit.version(),
                name: unit.name().to_string(),
                status: if applied.contains(&unit.version()) {
                    MigrationStatus::Applied
                } else {
                    MigrationStatus::Pending
                },
            })
            .collect())
    }

    /// Roll back everything that is applied, then migrate from scratch
    ///
    /// Returns the result of the migrate phase. A failure while rolling back
    /// is returned as is and nothing is reapplied.
    pub async fn reset(
        &self,
        ctx: &Connection,
        registry: &dyn MigrationRegistry,
    ) -> Result<usize, RunError> {
        self.ensure_bookkeeping(ctx).await.map_err(|e| RunError::new(0, e))?;
        let applied = self.applied_versions(ctx).await.map_err(|e| RunError::new(0, e))?;

        let rolled_back = self.rollback(ctx, registry, applied.len()).await?;
        info!(database = ctx.database(), rolled_back, "Reset rolled back migrations");

        self.migrate(ctx, registry).await
    }

    /// [`migrate`](Self::migrate) against the default registry
    pub async fn migrate_default(&self, ctx: &Connection) -> Result<usize, RunError> {
        let registry = self.default_registry().map_err(|e| RunError::new(0, e))?;
        self.migrate(ctx, registry.as_ref()).await
    }

    /// [`rollback`](Self::rollback) against the default registry
    pub async fn rollback_default(&self, ctx: &Connection, n: usize) -> Result<usize, RunError> {
        let registry = self.default_registry().map_err(|e| RunError::new(0, e))?;
        self.rollback(ctx, registry.as_ref(), n).await
    }

    /// [`status`](Self::status) against the default registry
    pub async fn status_default(&self, ctx: &Connection) -> ArcadeResult<Vec<MigrationStatusEntry>> {
        let registry = self.default_registry()?;
        self.status(ctx, registry.as_ref()).await
    }

    /// [`reset`](Self::reset) against the default registry
    pub async fn reset_default(&self, ctx: &Connection) -> Result<usize, RunError> {
        let registry = self.default_registry().map_err(|e| RunError::new(0, e))?;
        self.reset(ctx, registry.as_ref()).await
    }

    async fn run_sequence(
        &self,
        ctx: &Connection,
        units: Vec<Arc<dyn Migration>>,
        direction: MigrationDirection,
    ) -> Result<usize, RunError> {
        let mut completed = 0;

        for unit in units {
            info!(
                version = unit.version(),
                name = unit.name(),
                direction = %direction,
                "Running migration"
            );

            if let Err(e) = self.run_one(ctx, unit.as_ref(), direction).await {
                error!(
                    version = unit.version(),
                    completed,
                    error = %e,
                    "Migration run stopped"
                );
                return Err(RunError::new(completed, e));
            }
            completed += 1;
        }

        info!(database = ctx.database(), completed, direction = %direction, "Migration run finished");
        Ok(completed)
    }
}

impl std::fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("config", &self.config)
            .field("default_registry", &self.default_registry.is_some())
            .finish()
    }
}
