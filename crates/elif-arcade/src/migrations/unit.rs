//! Migration units
//!
//! A unit is anything implementing [`Migration`]: a version, a name and a
//! pair of forward/backward procedures run against a [`Connection`].

use async_trait::async_trait;
use tracing::debug;

use crate::connection::Connection;
use crate::error::ArcadeResult;
use crate::executor::{Language, Request};

/// Trait that all migrations must implement
///
/// Versions order execution (ascending to apply, descending to roll back)
/// and must be unique and positive within a registry. They do not have to be
/// contiguous; timestamps such as `20240101120000` work well.
#[async_trait]
pub trait Migration: Send + Sync {
    fn version(&self) -> i64;

    fn name(&self) -> &str;

    /// Apply the schema change
    async fn up(&self, ctx: &Connection) -> ArcadeResult<()>;

    /// Undo the schema change
    async fn down(&self, ctx: &Connection) -> ArcadeResult<()>;
}

/// A migration made of command requests run in order
///
/// ```ignore
/// let unit = SqlMigration::new(1, "create_article")
///     .up_sql("CREATE DOCUMENT TYPE Article")
///     .up_sql("CREATE PROPERTY Article.title STRING")
///     .down_sql("DROP TYPE Article");
/// ```
#[derive(Debug, Clone)]
pub struct SqlMigration {
    version: i64,
    name: String,
    up: Vec<Request>,
    down: Vec<Request>,
}

impl SqlMigration {
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up: Vec::new(),
            down: Vec::new(),
        }
    }

    /// Add a SQL statement to the forward step
    pub fn up_sql(mut self, statement: impl Into<String>) -> Self {
        self.up.push(Request::sql(statement));
        self
    }

    /// Add a SQL statement to the backward step
    pub fn down_sql(mut self, statement: impl Into<String>) -> Self {
        self.down.push(Request::sql(statement));
        self
    }

    /// Add a multi-statement script to the forward step
    pub fn up_script(mut self, script: impl Into<String>) -> Self {
        self.up.push(Request::new(Language::Sqlscript, script));
        self
    }

    /// Add a multi-statement script to the backward step
    pub fn down_script(mut self, script: impl Into<String>) -> Self {
        self.down.push(Request::new(Language::Sqlscript, script));
        self
    }

    /// Add an arbitrary request to the forward step
    pub fn up_request(mut self, request: Request) -> Self {
        self.up.push(request);
        self
    }

    /// Add an arbitrary request to the backward step
    pub fn down_request(mut self, request: Request) -> Self {
        self.down.push(request);
        self
    }

    pub fn up_requests(&self) -> &[Request] {
        &self.up
    }

    pub fn down_requests(&self) -> &[Request] {
        &self.down
    }

    async fn run_all(&self, ctx: &Connection, requests: &[Request]) -> ArcadeResult<()> {
        for request in requests {
            debug!(version = self.version, command = %request.command, "Running migration statement");
            ctx.command(request.clone()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn version(&self) -> i64 {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, ctx: &Connection) -> ArcadeResult<()> {
        self.run_all(ctx, &self.up).await
    }

    async fn down(&self, ctx: &Connection) -> ArcadeResult<()> {
        self.run_all(ctx, &self.down).await
    }
}
