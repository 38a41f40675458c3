//! Bookkeeping store - the document type recording applied migrations

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::definitions::{MigrationRecord, TIMESTAMP_FORMAT};
use crate::connection::Connection;
use crate::error::ArcadeResult;

/// SQL for the bookkeeping type named `type_name`
///
/// The name is validated by [`MigrationConfig::validate`](super::MigrationConfig::validate)
/// before any of these statements are built.
#[derive(Debug, Clone)]
pub(crate) struct Bookkeeping<'a> {
    type_name: &'a str,
}

impl<'a> Bookkeeping<'a> {
    pub(crate) fn new(type_name: &'a str) -> Self {
        Self { type_name }
    }

    /// Does the bookkeeping type exist in the schema?
    pub(crate) async fn type_exists(&self, ctx: &Connection) -> ArcadeResult<bool> {
        let rows = ctx
            .sql_query(
                "SELECT name FROM schema:types WHERE name = :name",
                json!({ "name": self.type_name }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Name the server gives the unique index on `version`
    pub(crate) fn index_name(&self) -> String {
        format!("{}[version]", self.type_name)
    }

    /// Is the unique index on `version` in place?
    ///
    /// The index is the last thing created, so its presence means the whole
    /// bookkeeping schema is there.
    pub(crate) async fn is_complete(&self, ctx: &Connection) -> ArcadeResult<bool> {
        let rows = ctx
            .sql_query(
                "SELECT name FROM schema:indexes WHERE name = :name",
                json!({ "name": self.index_name() }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Statements creating the type, its properties and the unique version index
    ///
    /// Each one is a no-op when its target already exists, so a partially
    /// created schema is finished by running them all again.
    pub(crate) fn create_statements(&self) -> Vec<String> {
        let t = self.type_name;
        vec![
            format!("CREATE DOCUMENT TYPE {} IF NOT EXISTS", t),
            format!("CREATE PROPERTY {}.version IF NOT EXISTS LONG", t),
            format!("CREATE PROPERTY {}.name IF NOT EXISTS STRING", t),
            format!("CREATE PROPERTY {}.applied_at IF NOT EXISTS DATETIME", t),
            format!("CREATE INDEX IF NOT EXISTS ON {} (version) UNIQUE", t),
        ]
    }

    pub(crate) async fn create(&self, ctx: &Connection) -> ArcadeResult<()> {
        for statement in self.create_statements() {
            debug!(statement = %statement, "Creating bookkeeping schema");
            ctx.sql_command(&statement, serde_json::Value::Null).await?;
        }
        Ok(())
    }

    /// All rows, ascending by version
    pub(crate) async fn records(&self, ctx: &Connection) -> ArcadeResult<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version ASC",
            self.type_name
        );
        let rows = ctx.sql_query(&sql, serde_json::Value::Null).await?;

        let mut records = rows
            .iter()
            .map(MigrationRecord::from_row)
            .collect::<ArcadeResult<Vec<_>>>()?;
        records.sort_by_key(|record| record.version);
        Ok(records)
    }

    pub(crate) async fn insert(&self, ctx: &Connection, version: i64, name: &str) -> ArcadeResult<()> {
        let sql = format!(
            "INSERT INTO {} SET version = :version, name = :name, applied_at = :applied_at",
            self.type_name
        );
        let applied_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        ctx.sql_command(
            &sql,
            json!({ "version": version, "name": name, "applied_at": applied_at }),
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, ctx: &Connection, version: i64) -> ArcadeResult<()> {
        let sql = format!("DELETE FROM {} WHERE version = :version", self.type_name);
        ctx.sql_command(&sql, json!({ "version": version })).await?;
        Ok(())
    }
}
