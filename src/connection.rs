//! # Connection Handle
//!
//! Owns the service endpoint, credentials, HTTP client and session for one
//! facade instance. Builds endpoint URLs, attaches credentials and turns
//! non-success responses into `ApiError`s.
//!
//! Created once at facade construction; a missing or malformed URL or key
//! fails here, before any request.

use bytes::Bytes;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::errors::{ApiError, ClientError, ClientResult, ErrorKind, TransportError};
use crate::query::Statement;
use crate::session::SessionStore;

const REST_PREFIX: [&str; 2] = ["rest", "v1"];
const AUTH_PREFIX: [&str; 2] = ["auth", "v1"];
const STORAGE_PREFIX: [&str; 2] = ["storage", "v1"];

/// Media type asking for a single row as an object
pub const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// Realtime protocol version sent on connect
pub const REALTIME_VSN: &str = "1.0.0";

/// Connection handle
#[derive(Debug)]
pub struct Connection {
    config: ClientConfig,
    base: Url,
    http: reqwest::Client,
    session: SessionStore,
}

impl Connection {
    /// Validate the config and build the HTTP client
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let base = config.base_url()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| {
                ClientError::with_source(
                    ErrorKind::Connection,
                    "Failed to initialize client: cannot build HTTP client",
                    e.into(),
                )
            })?;

        Ok(Self {
            config,
            base,
            http,
            session: SessionStore::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    // ==================
    // Endpoints
    // ==================

    fn endpoint<'a>(&self, prefix: &[&str], rest: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(prefix).extend(rest);
        }
        url
    }

    /// `{url}/rest/v1/{table}`
    pub fn rest_url(&self, table: &str) -> Url {
        self.endpoint(&REST_PREFIX, [table])
    }

    /// `{url}/rest/v1/rpc/{function}`
    pub fn rpc_url(&self, function: &str) -> Url {
        self.endpoint(&REST_PREFIX, ["rpc", function])
    }

    /// `{url}/auth/v1/{path...}`
    pub fn auth_url(&self, path: &[&str]) -> Url {
        self.endpoint(&AUTH_PREFIX, path.iter().copied())
    }

    /// `{url}/storage/v1/{path...}`; object paths are split on `/`
    pub fn storage_url(&self, path: &[&str]) -> Url {
        self.endpoint(
            &STORAGE_PREFIX,
            path.iter().flat_map(|p| p.split('/')).filter(|s| !s.is_empty()),
        )
    }

    /// `ws(s)://{host}/realtime/v1/websocket?apikey=..&vsn=1.0.0`
    pub fn realtime_url(&self) -> ClientResult<Url> {
        let mut url = self.endpoint(&[], ["realtime", "v1", "websocket"]);
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::connection(format!("Cannot derive realtime URL from {}", self.base)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.config.api_key)
            .append_pair("vsn", REALTIME_VSN);
        Ok(url)
    }

    // ==================
    // Requests
    // ==================

    /// Bearer credential: the session's access token, or the API key
    pub fn bearer(&self) -> String {
        self.session
            .access_token()
            .unwrap_or_else(|| self.config.api_key.clone())
    }

    /// Request with `apikey` and `Authorization` attached
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_with_token(method, url, &self.bearer())
    }

    /// Request authorized with an explicit token
    pub fn request_with_token(&self, method: Method, url: Url, token: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", token))
    }

    /// Send, mapping non-success statuses to `ApiError`
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await?;
        Err(ApiError::from_body(status.as_u16(), &body).into())
    }

    /// Send and read the raw body
    pub async fn send_bytes(&self, request: RequestBuilder) -> Result<Bytes, TransportError> {
        let response = self.send(request).await?;
        Ok(response.bytes().await?)
    }

    /// Send and decode a JSON body; an empty body decodes to `Null`
    pub async fn send_json(&self, request: RequestBuilder) -> Result<Value, TransportError> {
        let body = self.send_bytes(request).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Execute a compiled row statement
    pub async fn send_statement(&self, stmt: &Statement) -> Result<Value, TransportError> {
        let mut url = self.rest_url(&stmt.table);
        if !stmt.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &stmt.params {
                pairs.append_pair(key, value);
            }
        }

        let mut request = self.request(stmt.method.clone(), url);
        request = self.with_profile(request, &stmt.method);

        if let Some(prefer) = stmt.prefer_header() {
            request = request.header("Prefer", prefer);
        }
        if stmt.accept_object {
            request = request.header(ACCEPT, OBJECT_MEDIA_TYPE);
        }
        if let Some(body) = &stmt.body {
            request = request.json(body);
        }

        self.send_json(request).await
    }

    /// Call a stored procedure with named arguments
    pub async fn send_rpc(&self, function: &str, params: &Value) -> Result<Value, TransportError> {
        let request = self
            .request(Method::POST, self.rpc_url(function))
            .header(CONTENT_TYPE, "application/json")
            .json(params);
        let request = self.with_profile(request, &Method::POST);
        self.send_json(request).await
    }

    /// Schema selection headers for non-default schemas
    fn with_profile(&self, request: RequestBuilder, method: &Method) -> RequestBuilder {
        let schema = self.config.schema.as_str();
        if schema == "public" {
            return request;
        }
        if *method == Method::GET || *method == Method::HEAD {
            request.header("Accept-Profile", schema)
        } else {
            request.header("Content-Profile", schema)
        }
    }
}
