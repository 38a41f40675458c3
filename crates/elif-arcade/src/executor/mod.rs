//! Command/Query Executor
//!
//! The executor is the only component that talks to the server. Everything
//! above it (transactions, migrations) is written against the [`Executor`]
//! trait so the transport can be swapped out.

pub mod http;
pub mod request;

pub use http::{HttpExecutor, SESSION_HEADER};
pub use request::{Language, Request};

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::ArcadeResult;
use crate::transaction::IsolationLevel;

/// Transport used by a [`Connection`]
///
/// Implementations must attach `ctx.session_id()` to `query` and `command`
/// requests when it is present, so that work issued through a session
/// context joins that session's transaction.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a read-only request against the query endpoint
    async fn query(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>>;

    /// Run a request that may change schema or data against the command endpoint
    async fn command(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>>;

    /// Open a server-side session and return its id
    async fn begin(&self, ctx: &Connection, isolation: Option<IsolationLevel>) -> ArcadeResult<String>;

    /// Commit the session bound to `ctx`
    async fn commit(&self, ctx: &Connection) -> ArcadeResult<()>;

    /// Roll back the session bound to `ctx`
    async fn rollback(&self, ctx: &Connection) -> ArcadeResult<()>;

    /// Whether `ctx.database()` exists on the server
    async fn exists(&self, ctx: &Connection) -> ArcadeResult<bool>;

    /// Run a server-level command such as `create database cms`
    async fn server_command(&self, ctx: &Connection, command: &str) -> ArcadeResult<Value>;
}
