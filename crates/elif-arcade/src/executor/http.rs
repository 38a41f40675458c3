//! HTTP executor backed by a pooled `reqwest` client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::request::Request;
use super::Executor;
use crate::config::ConnectOptions;
use crate::connection::Connection;
use crate::error::{ArcadeError, ArcadeResult};
use crate::transaction::IsolationLevel;

/// Header carrying the server-assigned session id
pub const SESSION_HEADER: &str = "arcadedb-session-id";

/// Executor that speaks the server's HTTP/JSON API
///
/// The inner `reqwest::Client` owns the socket pool; cloning the executor
/// shares it.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    api_prefix: String,
}

impl HttpExecutor {
    /// Build an executor and its connection pool
    pub fn new(options: &ConnectOptions) -> ArcadeResult<Self> {
        let client = Client::builder()
            .timeout(options.timeout())
            .pool_max_idle_per_host(options.pool_max_idle)
            .build()
            .map_err(|e| ArcadeError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, options.api_prefix.clone()))
    }

    /// Wrap an existing client
    pub fn with_client(client: Client, api_prefix: impl Into<String>) -> Self {
        Self {
            client,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Build `{endpoint}{api_prefix}/{segments...}`, percent-encoding each segment
    fn url(&self, ctx: &Connection, segments: &[&str]) -> ArcadeResult<Url> {
        let mut url = Url::parse(ctx.endpoint())?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ArcadeError::Configuration(format!("Endpoint '{}' cannot carry a path", ctx.endpoint()))
            })?;
            path.pop_if_empty();
            path.extend(self.api_prefix.split('/').filter(|s| !s.is_empty()));
            path.extend(segments);
        }
        Ok(url)
    }

    /// Attach credentials and, when `with_session` is set, the session header
    fn authorize(&self, ctx: &Connection, builder: RequestBuilder, with_session: bool) -> RequestBuilder {
        let builder = match ctx.credentials() {
            Some(credentials) => builder.basic_auth(&credentials.username, Some(&credentials.password)),
            None => builder,
        };

        match ctx.session_id() {
            Some(session_id) if with_session => builder.header(SESSION_HEADER, session_id),
            _ => builder,
        }
    }

    async fn execute(&self, ctx: &Connection, endpoint: &str, request: Request) -> ArcadeResult<Vec<Value>> {
        let url = self.url(ctx, &[endpoint, ctx.database()])?;
        debug!(
            database = ctx.database(),
            language = %request.language,
            session = ?ctx.session_id(),
            "POST /{} {}",
            endpoint,
            request.command
        );

        let builder = self.authorize(ctx, self.client.post(url), true).json(&request);
        let body = read_body(builder.send().await?).await?;
        Ok(into_records(body))
    }

    async fn session_call(&self, ctx: &Connection, endpoint: &str) -> ArcadeResult<()> {
        if ctx.session_id().is_none() {
            return Err(ArcadeError::NoActiveTransaction);
        }

        let url = self.url(ctx, &[endpoint, ctx.database()])?;
        debug!(database = ctx.database(), session = ?ctx.session_id(), "POST /{}", endpoint);

        let builder = self.authorize(ctx, self.client.post(url), true);
        read_body(builder.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn query(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>> {
        self.execute(ctx, "query", request).await
    }

    async fn command(&self, ctx: &Connection, request: Request) -> ArcadeResult<Vec<Value>> {
        self.execute(ctx, "command", request).await
    }

    async fn begin(&self, ctx: &Connection, isolation: Option<IsolationLevel>) -> ArcadeResult<String> {
        let url = self.url(ctx, &["begin", ctx.database()])?;
        debug!(database = ctx.database(), ?isolation, "POST /begin");

        let mut builder = self.authorize(ctx, self.client.post(url), false);
        if let Some(level) = isolation {
            builder = builder.json(&json!({ "isolationLevel": level.as_str() }));
        }

        let response = builder.send().await?;
        let header_session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = read_body(response).await?;
        header_session
            .or_else(|| session_from_body(&body))
            .ok_or_else(|| ArcadeError::Remote {
                status: StatusCode::OK.as_u16(),
                message: "Server did not return a session id".to_string(),
                detail: Some(body.to_string()),
            })
    }

    async fn commit(&self, ctx: &Connection) -> ArcadeResult<()> {
        self.session_call(ctx, "commit").await
    }

    async fn rollback(&self, ctx: &Connection) -> ArcadeResult<()> {
        self.session_call(ctx, "rollback").await
    }

    async fn exists(&self, ctx: &Connection) -> ArcadeResult<bool> {
        let url = self.url(ctx, &["exists", ctx.database()])?;
        debug!(database = ctx.database(), "GET /exists");

        let builder = self.authorize(ctx, self.client.get(url), false);
        let body = read_body(builder.send().await?).await?;
        match body.get("result").unwrap_or(&body) {
            Value::Bool(exists) => Ok(*exists),
            other => Err(ArcadeError::Serialization(format!(
                "Expected a boolean existence result, got {}",
                other
            ))),
        }
    }

    async fn server_command(&self, ctx: &Connection, command: &str) -> ArcadeResult<Value> {
        let url = self.url(ctx, &["server"])?;
        debug!(command, "POST /server");

        let builder = self
            .authorize(ctx, self.client.post(url), false)
            .json(&json!({ "command": command }));
        let mut body = read_body(builder.send().await?).await?;
        let result = body.as_object_mut().and_then(|map| map.remove("result"));
        Ok(result.unwrap_or(body))
    }
}

/// Read a response body, turning non-success statuses into [`ArcadeError::Remote`]
async fn read_body(response: Response) -> ArcadeResult<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ArcadeError::Connection(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        let err = remote_error(status, &text);
        warn!(status = status.as_u16(), error = %err, "request rejected by server");
        return Err(err);
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Map an error body `{error, detail?, exception?}` to a remote error
fn remote_error(status: StatusCode, text: &str) -> ArcadeError {
    let parsed: Option<Value> = serde_json::from_str(text).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let message = field("error")
        .or_else(|| field("exception"))
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    let detail = match (field("detail"), field("exception")) {
        (Some(detail), _) => Some(detail),
        (None, Some(exception)) if exception != message => Some(exception),
        _ => None,
    };

    ArcadeError::Remote {
        status: status.as_u16(),
        message,
        detail,
    }
}

/// Extract the `result` list; a scalar result becomes a one-element list
fn into_records(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("result") {
            Some(Value::Array(records)) => records,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        },
        Value::Array(records) => records,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn session_from_body(body: &Value) -> Option<String> {
    body.get("sessionId")
        .or_else(|| body.get("result"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_from_json_body() {
        let err = remote_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"Syntax error","detail":"line 1","exception":"com.arcadedb.ParseException"}"#,
        );
        match err {
            ArcadeError::Remote { status, message, detail } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Syntax error");
                assert_eq!(detail.as_deref(), Some("line 1"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_remote_error_from_plain_text() {
        match remote_error(StatusCode::INTERNAL_SERVER_ERROR, "boom") {
            ArcadeError::Remote { status, message, detail } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
                assert!(detail.is_none());
            }
            other => panic!("unexpected error: {:?}", other),
        }

        match remote_error(StatusCode::NOT_FOUND, "") {
            ArcadeError::Remote { message, .. } => assert_eq!(message, "Not Found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_into_records() {
        assert_eq!(into_records(json!({"result": [{"a": 1}, {"a": 2}]})).len(), 2);
        assert_eq!(into_records(json!({"result": 5})), vec![json!(5)]);
        assert!(into_records(json!({"user": "root"})).is_empty());
        assert!(into_records(Value::Null).is_empty());
    }

    #[test]
    fn test_session_from_body() {
        assert_eq!(session_from_body(&json!({"sessionId": "AS-1"})).as_deref(), Some("AS-1"));
        assert_eq!(session_from_body(&json!({"result": "AS-2"})).as_deref(), Some("AS-2"));
        assert!(session_from_body(&json!({"result": 1})).is_none());
    }
}
