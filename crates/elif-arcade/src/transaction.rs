//! Transaction Management
//!
//! Sessions are opened on the server with `begin`, threaded through a
//! session-scoped [`Connection`] and closed with exactly one `commit` or
//! `rollback`. [`transaction`] wraps the whole lifecycle around a unit of
//! work and converts errors, abort signals and panics into a rollback plus a
//! typed error.
//!
//! Panic capture relies on unwinding. Building with `panic = "abort"` turns a
//! panicking unit of work into a process abort with the session left open
//! until the server times it out.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{ArcadeError, ArcadeResult};

/// Isolation levels accepted by the server's begin endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Server default
    ReadCommitted,
    /// Reads inside the session see a stable snapshot
    RepeatableRead,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
        }
    }
}

/// Transaction configuration options
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Isolation level requested at begin; `None` leaves the server default
    pub isolation_level: Option<IsolationLevel>,
    /// Rerun the unit of work when it fails on a concurrent modification
    pub auto_retry: bool,
    /// Maximum number of extra attempts when `auto_retry` is set
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            isolation_level: None,
            auto_retry: false,
            max_retries: 3,
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn auto_retry(mut self, max_retries: u32) -> Self {
        self.auto_retry = true;
        self.max_retries = max_retries;
        self
    }
}

/// Ways a unit of work can end without a value
///
/// `Error` is an ordinary failure. `Abort` is an explicit request to
/// abandon the transaction that is not itself an error in the work.
#[derive(Debug, Error)]
pub enum TransactionFault {
    #[error(transparent)]
    Error(#[from] ArcadeError),
    #[error("aborted: {0}")]
    Abort(String),
}

impl TransactionFault {
    pub fn abort(signal: impl Into<String>) -> Self {
        TransactionFault::Abort(signal.into())
    }
}

/// Open a session on `ctx.database()` and return its id
pub async fn begin(ctx: &Connection) -> ArcadeResult<String> {
    begin_with(ctx, &TransactionConfig::default()).await
}

/// Open a session using the isolation level from `config`
pub async fn begin_with(ctx: &Connection, config: &TransactionConfig) -> ArcadeResult<String> {
    debug!(database = ctx.database(), isolation = ?config.isolation_level, "Beginning transaction");
    let session_id = ctx.executor().begin(ctx, config.isolation_level).await?;
    debug!(database = ctx.database(), session = %session_id, "Transaction started");
    Ok(session_id)
}

/// Commit the session bound to `ctx`
pub async fn commit(ctx: &Connection) -> ArcadeResult<()> {
    let session_id = ctx.session_id().ok_or(ArcadeError::NoActiveTransaction)?;
    debug!(database = ctx.database(), session = session_id, "Committing transaction");
    ctx.executor().commit(ctx).await?;
    debug!(database = ctx.database(), session = session_id, "Transaction committed successfully");
    Ok(())
}

/// Roll back the session bound to `ctx`
///
/// Best effort: without a session this is a no-op, and a failing remote
/// rollback is logged and reported as success so it never hides the fault
/// that triggered it.
pub async fn rollback(ctx: &Connection) -> ArcadeResult<()> {
    let Some(session_id) = ctx.session_id() else {
        return Ok(());
    };

    debug!(database = ctx.database(), session = session_id, "Rolling back transaction");
    if let Err(e) = ctx.executor().rollback(ctx).await {
        warn!(
            database = ctx.database(),
            session = session_id,
            error = %e,
            "Rollback failed, ignoring"
        );
    }
    Ok(())
}

/// Run `work` inside a fresh session
///
/// `work` receives the session-scoped connection. A value commits; an error
/// returns [`ArcadeError::TransactionFailed`]; an abort or a panic returns
/// [`ArcadeError::TransactionAborted`]. Both failure paths roll back first.
pub async fn transaction<T, F, Fut>(ctx: &Connection, work: F) -> ArcadeResult<T>
where
    F: FnOnce(Connection) -> Fut,
    Fut: Future<Output = Result<T, TransactionFault>>,
{
    run_attempt(ctx, &TransactionConfig::default(), work).await
}

/// Like [`transaction`], with isolation and retry settings
///
/// With `auto_retry`, a failure caused by a concurrent modification reruns
/// `work` in a new session, up to `max_retries` extra times.
pub async fn transaction_with<T, F, Fut>(
    ctx: &Connection,
    config: &TransactionConfig,
    mut work: F,
) -> ArcadeResult<T>
where
    F: FnMut(Connection) -> Fut,
    Fut: Future<Output = Result<T, TransactionFault>>,
{
    let max_attempts = if config.auto_retry { config.max_retries + 1 } else { 1 };
    let mut attempts = 0;

    loop {
        attempts += 1;
        debug!("Starting transaction attempt {} of {}", attempts, max_attempts);

        match run_attempt(ctx, config, &mut work).await {
            Err(err) if attempts < max_attempts && is_retryable(&err) => {
                warn!("Concurrent modification on attempt {}, retrying: {}", attempts, err);
            }
            result => return result,
        }
    }
}

async fn run_attempt<T, F, Fut>(ctx: &Connection, config: &TransactionConfig, work: F) -> ArcadeResult<T>
where
    F: FnOnce(Connection) -> Fut,
    Fut: Future<Output = Result<T, TransactionFault>>,
{
    let session_id = begin_with(ctx, config).await?;
    let session_ctx = ctx.with_session(session_id);

    let work_ctx = session_ctx.clone();
    let outcome = AssertUnwindSafe(async move { work(work_ctx).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => match commit(&session_ctx).await {
            Ok(()) => Ok(value),
            Err(e) => Err(ArcadeError::transaction_failed(e)),
        },
        Ok(Err(TransactionFault::Error(e))) => {
            debug!(error = %e, "Transaction work failed");
            rollback(&session_ctx).await.ok();
            Err(ArcadeError::transaction_failed(e))
        }
        Ok(Err(TransactionFault::Abort(signal))) => {
            debug!(signal = %signal, "Transaction work aborted");
            rollback(&session_ctx).await.ok();
            Err(ArcadeError::TransactionAborted { signal })
        }
        Err(panic) => {
            let signal = panic_message(panic.as_ref());
            warn!(signal = %signal, "Transaction work panicked");
            rollback(&session_ctx).await.ok();
            Err(ArcadeError::TransactionAborted { signal })
        }
    }
}

/// Check if an error comes from a concurrent modification conflict
pub fn is_retryable(error: &ArcadeError) -> bool {
    match error.root_cause() {
        ArcadeError::Remote { status, message, detail } => {
            let mentions = |text: &str| {
                text.contains("ConcurrentModificationException") || text.contains("NeedRetryException")
            };
            *status == 409 || mentions(message) || detail.as_deref().map_or(false, mentions)
        }
        _ => false,
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic".to_string()
    }
}
