//! Request body sent to the command and query endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Query language understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sql,
    Sqlscript,
    Cypher,
    Gremlin,
    Graphql,
    Mongo,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Sql => "sql",
            Language::Sqlscript => "sqlscript",
            Language::Cypher => "cypher",
            Language::Gremlin => "gremlin",
            Language::Graphql => "graphql",
            Language::Mongo => "mongo",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single command or query request
///
/// Unset optional fields are left out of the JSON body so the server
/// applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub language: Language,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Forwarded to the server untouched; the client never retries by itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serializer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_response: Option<bool>,
}

impl Request {
    pub fn new(language: Language, command: impl Into<String>) -> Self {
        Self {
            language,
            command: command.into(),
            params: None,
            limit: None,
            retries: None,
            serializer: None,
            await_response: None,
        }
    }

    pub fn sql(command: impl Into<String>) -> Self {
        Self::new(Language::Sql, command)
    }

    /// Bind a single named parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replace all parameters; a non-object value clears them
    pub fn params(mut self, params: Value) -> Self {
        self.params = match params {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn serializer(mut self, serializer: impl Into<String>) -> Self {
        self.serializer = Some(serializer.into());
        self
    }

    pub fn await_response(mut self, await_response: bool) -> Self {
        self.await_response = Some(await_response);
        self
    }
}
