//! Connection Context
//!
//! A [`Connection`] is a cheap, immutable value describing where requests go:
//! endpoint, database, credentials, an optional session id and a handle to
//! the shared executor pool. Switching database or session produces a new
//! value; the original is never modified.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::config::{ArcadeConfig, ConnectOptions, Credentials};
use crate::error::ArcadeResult;
use crate::executor::{Executor, HttpExecutor, Request};

#[derive(Clone)]
pub struct Connection {
    endpoint: String,
    database: String,
    credentials: Option<Credentials>,
    session_id: Option<String>,
    pool: Arc<dyn Executor>,
}

impl Connection {
    /// Create a connection backed by a fresh HTTP pool
    ///
    /// Only validates and builds the client; no request is sent.
    pub fn connect(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        options: ConnectOptions,
    ) -> ArcadeResult<Self> {
        let config = ArcadeConfig::new(endpoint, database).with_options(options);
        Self::from_config(&config)
    }

    /// Create a connection from a loaded configuration
    pub fn from_config(config: &ArcadeConfig) -> ArcadeResult<Self> {
        config.validate()?;
        let executor = HttpExecutor::new(&config.options)?;
        Ok(Self::with_executor(
            config.endpoint.clone(),
            config.database.clone(),
            config.options.credentials.clone(),
            Arc::new(executor),
        ))
    }

    /// Create a connection over any executor
    pub fn with_executor(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        credentials: Option<Credentials>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            credentials,
            session_id: None,
            pool: executor,
        }
    }

    /// Copy of this connection targeting another database
    ///
    /// A session only belongs to the database it was opened on, so the copy
    /// never carries one.
    pub fn with_database(&self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            session_id: None,
            ..self.clone()
        }
    }

    /// Copy of this connection bound to `session_id`
    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..self.clone()
        }
    }

    /// Copy of this connection with no session
    pub fn without_session(&self) -> Self {
        Self {
            session_id: None,
            ..self.clone()
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn in_transaction(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.pool
    }

    pub async fn query(&self, request: Request) -> ArcadeResult<Vec<Value>> {
        self.pool.query(self, request).await
    }

    pub async fn command(&self, request: Request) -> ArcadeResult<Vec<Value>> {
        self.pool.command(self, request).await
    }

    /// Run a SQL query with named parameters (`Value::Null` for none)
    pub async fn sql_query(&self, text: &str, params: Value) -> ArcadeResult<Vec<Value>> {
        self.query(Request::sql(text).params(params)).await
    }

    /// Run a SQL command with named parameters (`Value::Null` for none)
    pub async fn sql_command(&self, text: &str, params: Value) -> ArcadeResult<Vec<Value>> {
        self.command(Request::sql(text).params(params)).await
    }

    pub async fn exists(&self) -> ArcadeResult<bool> {
        self.pool.exists(self).await
    }

    /// Create the database this connection targets
    pub async fn create_database(&self) -> ArcadeResult<()> {
        let command = format!("create database {}", self.database);
        self.pool.server_command(self, &command).await?;
        Ok(())
    }

    /// Drop the database this connection targets
    pub async fn drop_database(&self) -> ArcadeResult<()> {
        let command = format!("drop database {}", self.database);
        self.pool.server_command(self, &command).await?;
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("credentials", &self.credentials)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
