//! HTTP client for the relational backend (PostgREST tables under
//! `/rest/v1`, authentication under `/auth/v1`).

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, Result};
use crate::query::Query;
use crate::relational::{AuthBackend, RelationalBackend, Session};

const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";

/// One client instance per application run, constructed at startup and
/// shared behind an `Arc`.
pub struct RestClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    session: RwLock<Option<Session>>,
}

impl RestClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self::with_http(HttpClient::new(), base_url, api_key)
    }

    pub fn with_http(http: HttpClient, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    /// Attach the API key and the bearer token: the session's access token
    /// when signed in, the API key otherwise.
    async fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let bearer = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.api_key.clone(),
        };
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    async fn send_rows(&self, req: RequestBuilder) -> Result<Vec<Value>> {
        let resp = self.authorize(req).await.send().await?;
        let body = read_body(resp).await?;
        rows_from_body(&body)
    }
}

/// Read a response body, turning a non-success status into an error.
async fn read_body(resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(RemoteError::from_response(status.as_u16(), &body));
    }
    Ok(body)
}

/// PostgREST answers with an array, a single object, or nothing at all.
fn rows_from_body(body: &str) -> Result<Vec<Value>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(rows) => Ok(rows),
        obj @ Value::Object(_) => Ok(vec![obj]),
        other => Err(RemoteError::Malformed(format!(
            "expected rows, got {other}"
        ))),
    }
}

#[async_trait]
impl RelationalBackend for RestClient {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let req = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "*")])
            .query(&query.to_params());
        self.send_rows(req).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&row);
        self.send_rows(req).await
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<Vec<Value>> {
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", MERGE_DUPLICATES)
            .json(&row);
        self.send_rows(req).await
    }

    async fn update(&self, table: &str, patch: Value, query: &Query) -> Result<Vec<Value>> {
        let req = self
            .http
            .patch(self.table_url(table))
            .query(&query.to_params())
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&patch);
        self.send_rows(req).await
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let req = self
            .http
            .delete(self.table_url(table))
            .query(&query.to_params())
            .header("Prefer", RETURN_REPRESENTATION);
        self.send_rows(req).await
    }
}

#[async_trait]
impl AuthBackend for RestClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let req = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }));
        let body = read_body(req.send().await?).await?;
        let json: Value = serde_json::from_str(&body)?;

        let session = Session::from_json(&json);
        match &session {
            Some(s) => info!(user_id = %s.user.id, "signed up with session"),
            None => info!(email, "signed up, awaiting email confirmation"),
        }
        *self.session.write().await = session.clone();
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let req = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }));
        let body = read_body(req.send().await?).await?;
        let json: Value = serde_json::from_str(&body)?;

        let session = Session::from_json(&json)
            .ok_or_else(|| RemoteError::Malformed("token response without session".into()))?;
        info!(user_id = %session.user.id, "signed in");
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            debug!("sign out without session");
            return Ok(());
        };

        let req = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", session.access_token));
        match req.send().await {
            Ok(resp) => {
                read_body(resp).await?;
                info!(user_id = %session.user.id, "signed out");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "remote sign out failed; local session dropped");
                Err(e.into())
            }
        }
    }

    async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }
}
