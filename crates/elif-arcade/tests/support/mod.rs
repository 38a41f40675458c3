//! In-memory executor used by the integration tests
//!
//! Understands the handful of SQL shapes the crate and the tests issue.
//! Every session works on its own copy of the committed documents; commit
//! publishes the copy and rollback drops it.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Once};

use elif_arcade::{ArcadeError, ArcadeResult, Connection, Executor, IsolationLevel, Request};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Query,
    Command,
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub text: String,
    pub session: Option<String>,
}

/// Documents per type plus the names of the indexes that exist
#[derive(Debug, Clone, Default)]
struct Tables {
    types: BTreeMap<String, Vec<Value>>,
    indexes: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    committed: Tables,
    sessions: HashMap<String, Tables>,
    next_session: u64,
    calls: Vec<Call>,
    failures: Vec<(String, ArcadeError)>,
    commit_failures: Vec<ArcadeError>,
    rollback_fails: bool,
}

#[derive(Default, Clone)]
pub struct MemoryExecutor {
    state: Arc<Mutex<State>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> Connection {
        init_tracing();
        Connection::with_executor("http://memory", "test", None, Arc::new(self.clone()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Fail every query or command whose text contains `needle`
    pub fn fail_when(&self, needle: &str, error: ArcadeError) {
        self.state().failures.push((needle.to_string(), error));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Fail the next commits with the given errors, in order
    pub fn fail_commits(&self, errors: Vec<ArcadeError>) {
        self.state().commit_failures = errors;
    }

    pub fn fail_rollbacks(&self) {
        self.state().rollback_fails = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state().calls.iter().filter(|call| call.kind == kind).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Committed documents of `type_name`
    pub fn documents(&self, type_name: &str) -> Vec<Value> {
        self.state()
            .committed
            .types
            .get(type_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.state().committed.types.contains_key(type_name)
    }

    pub fn has_index(&self, index_name: &str) -> bool {
        self.state().committed.indexes.contains(index_name)
    }

    /// Create a committed type with the given documents
    pub fn seed(&self, type_name: &str, documents: Vec<Value>) {
        self.state()
            .committed
            .types
            .insert(type_name.to_string(), documents);
    }

    fn run(&self, kind: CallKind, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>> {
        let mut state = self.state();
        state.calls.push(Call {
            kind,
            text: request.command.clone(),
            session: ctx.session_id().map(str::to_string),
        });

        if let Some((_, error)) = state
            .failures
            .iter()
            .find(|(needle, _)| request.command.contains(needle.as_str()))
        {
            return Err(error.clone());
        }

        let params = request.params.clone().unwrap_or_default();
        let tables = match ctx.session_id() {
            Some(session) => state
                .sessions
                .get_mut(session)
                .ok_or_else(|| ArcadeError::remote(404, format!("Unknown session {}", session)))?,
            None => &mut state.committed,
        };

        execute_sql(tables, &request.command, &params)
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn query(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>> {
        self.run(CallKind::Query, ctx, request)
    }

    async fn command(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>> {
        self.run(CallKind::Command, ctx, request)
    }

    async fn begin(&self, ctx: &Connection, isolation: Option<IsolationLevel>) -> ArcadeResult<String> {
        let mut state = self.state();
        state.next_session += 1;
        let session = format!("AS-{}", state.next_session);
        state.calls.push(Call {
            kind: CallKind::Begin,
            text: isolation.map(|level| level.as_str().to_string()).unwrap_or_default(),
            session: ctx.session_id().map(str::to_string),
        });

        let snapshot = state.committed.clone();
        state.sessions.insert(session.clone(), snapshot);
        Ok(session)
    }

    async fn commit(&self, ctx: &Connection) -> ArcadeResult<()> {
        let session = ctx.session_id().ok_or(ArcadeError::NoActiveTransaction)?;
        let mut state = self.state();
        state.calls.push(Call {
            kind: CallKind::Commit,
            text: String::new(),
            session: Some(session.to_string()),
        });

        let tables = state
            .sessions
            .remove(session)
            .ok_or_else(|| ArcadeError::remote(404, format!("Unknown session {}", session)))?;

        if !state.commit_failures.is_empty() {
            return Err(state.commit_failures.remove(0));
        }

        state.committed = tables;
        Ok(())
    }

    async fn rollback(&self, ctx: &Connection) -> ArcadeResult<()> {
        let session = ctx.session_id().ok_or(ArcadeError::NoActiveTransaction)?;
        let mut state = self.state();
        state.calls.push(Call {
            kind: CallKind::Rollback,
            text: String::new(),
            session: Some(session.to_string()),
        });

        state.sessions.remove(session);
        if state.rollback_fails {
            return Err(ArcadeError::Connection("connection reset".to_string()));
        }
        Ok(())
    }

    async fn exists(&self, _ctx: &Connection) -> ArcadeResult<bool> {
        Ok(true)
    }

    async fn server_command(&self, _ctx: &Connection, command: &str) -> ArcadeResult<Value> {
        Ok(json!({ "result": command }))
    }
}

fn syntax_error(sql: &str) -> ArcadeError {
    ArcadeError::Remote {
        status: 400,
        message: "Syntax error".to_string(),
        detail: Some(sql.to_string()),
    }
}

fn missing_type(type_name: &str) -> ArcadeError {
    ArcadeError::Remote {
        status: 500,
        message: format!("Type '{}' was not found", type_name),
        detail: None,
    }
}

/// `WHERE field = :param` as (field, bound value)
fn where_clause(sql: &str, params: &Map<String, Value>) -> Option<(String, Value)> {
    let (_, rest) = sql.split_once(" WHERE ")?;
    let mut tokens = rest.split_whitespace();
    let field = tokens.next()?.to_string();
    let _eq = tokens.next()?;
    let param = tokens.next()?.trim_start_matches(':');
    Some((field, params.get(param).cloned().unwrap_or(Value::Null)))
}

fn matches(row: &Value, filter: &Option<(String, Value)>) -> bool {
    match filter {
        Some((field, value)) => row.get(field) == Some(value),
        None => true,
    }
}

fn execute_sql(tables: &mut Tables, sql: &str, params: &Map<String, Value>) -> ArcadeResult<Vec<Value>> {
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    let name_param = || params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();

    match tokens.as_slice() {
        ["SELECT", .., "FROM", "schema:types", "WHERE", "name", "=", ":name"] => {
            let name = name_param();
            Ok(if tables.types.contains_key(&name) {
                vec![json!({ "name": name })]
            } else {
                Vec::new()
            })
        }
        ["SELECT", .., "FROM", "schema:indexes", "WHERE", "name", "=", ":name"] => {
            let name = name_param();
            Ok(if tables.indexes.contains(&name) {
                vec![json!({ "name": name, "unique": true })]
            } else {
                Vec::new()
            })
        }
        ["CREATE", "DOCUMENT", "TYPE", type_name, rest @ ..] => {
            let if_not_exists = rest == ["IF", "NOT", "EXISTS"];
            if tables.types.contains_key(*type_name) {
                if if_not_exists {
                    return Ok(Vec::new());
                }
                return Err(ArcadeError::remote(500, format!("Type '{}' already exists", type_name)));
            }
            tables.types.insert(type_name.to_string(), Vec::new());
            Ok(vec![json!({ "operation": "create document type" })])
        }
        ["CREATE", "PROPERTY", target, ..] => {
            let type_name = target.split('.').next().unwrap_or_default();
            if !tables.types.contains_key(type_name) {
                return Err(missing_type(type_name));
            }
            Ok(vec![json!({ "operation": "create property" })])
        }
        ["CREATE", "INDEX", .., "ON", type_name, key, "UNIQUE"] => {
            if !tables.types.contains_key(*type_name) {
                return Err(missing_type(type_name));
            }
            let property = key.trim_start_matches('(').trim_end_matches(')');
            let index_name = format!("{}[{}]", type_name, property);
            let if_not_exists = tokens.contains(&"EXISTS");
            if !tables.indexes.insert(index_name.clone()) && !if_not_exists {
                return Err(ArcadeError::remote(500, format!("Index '{}' already exists", index_name)));
            }
            Ok(vec![json!({ "operation": "create index" })])
        }
        ["DROP", "TYPE", type_name] => {
            tables
                .types
                .remove(*type_name)
                .ok_or_else(|| missing_type(type_name))?;
            let prefix = format!("{}[", type_name);
            tables.indexes.retain(|index| !index.starts_with(&prefix));
            Ok(vec![json!({ "operation": "drop type" })])
        }
        ["SELECT", ..] => {
            let from = tokens
                .iter()
                .position(|token| *token == "FROM")
                .and_then(|index| tokens.get(index + 1))
                .ok_or_else(|| syntax_error(sql))?;
            let rows = tables.types.get(*from).ok_or_else(|| missing_type(from))?;
            let filter = where_clause(sql, params);
            Ok(rows.iter().filter(|row| matches(row, &filter)).cloned().collect())
        }
        ["INSERT", "INTO", type_name, "SET", ..] => {
            let unique_version = tables.indexes.contains(&format!("{}[version]", type_name));
            let rows = tables.types.get_mut(*type_name).ok_or_else(|| missing_type(type_name))?;
            if let Some(version) = params.get("version") {
                if unique_version && rows.iter().any(|row| row.get("version") == Some(version)) {
                    return Err(ArcadeError::Remote {
                        status: 503,
                        message: "Duplicated key".to_string(),
                        detail: Some("com.arcadedb.exception.DuplicatedKeyException".to_string()),
                    });
                }
            }
            let document = Value::Object(params.clone());
            rows.push(document.clone());
            Ok(vec![document])
        }
        ["UPDATE", type_name, "SET", field, "=", param, ..] => {
            let rows = tables.types.get_mut(*type_name).ok_or_else(|| missing_type(type_name))?;
            let filter = where_clause(sql, params);
            let value = params
                .get(param.trim_start_matches(':'))
                .cloned()
                .unwrap_or(Value::Null);
            let mut count = 0;
            for row in rows.iter_mut().filter(|row| matches(row, &filter)) {
                if let Value::Object(map) = row {
                    map.insert(field.to_string(), value.clone());
                    count += 1;
                }
            }
            Ok(vec![json!({ "count": count })])
        }
        ["DELETE", "FROM", type_name, ..] => {
            let rows = tables.types.get_mut(*type_name).ok_or_else(|| missing_type(type_name))?;
            let filter = where_clause(sql, params);
            let before = rows.len();
            rows.retain(|row| !matches(row, &filter));
            Ok(vec![json!({ "count": before - rows.len() })])
        }
        _ => Err(syntax_error(sql)),
    }
}
