use crate::error::{ClientError, Result};
use crate::types::{Ack, Backlinks, FileContent, FileRecord, GraphPayload, SearchHit};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Static credential pair presented on every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client for the knowledge base HTTP API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base: Url,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self> {
        Self::with_timeout(base_url, credentials, 10)
    }

    pub fn with_timeout(base_url: &str, credentials: Credentials, timeout_secs: u64) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("kbnav/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let url = self.endpoint("files", None)?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn read_file(&self, path: &str) -> Result<FileContent> {
        let url = self.endpoint("files", Some(path))?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<Ack> {
        let url = self.endpoint("files", Some(path))?;
        let request = self
            .request(Method::PUT, url)
            .json(&serde_json::json!({ "content": content }));
        self.send_ack(request).await
    }

    pub async fn delete_file(&self, path: &str) -> Result<Ack> {
        let url = self.endpoint("files", Some(path))?;
        self.send_ack(self.request(Method::DELETE, url)).await
    }

    pub async fn get_graph(&self) -> Result<GraphPayload> {
        let url = self.endpoint("graph", None)?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn get_backlinks(&self, path: &str) -> Result<Backlinks> {
        let url = self.endpoint("backlinks", Some(path))?;
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut url = self.endpoint("search", None)?;
        url.query_pairs_mut().append_pair("q", query);
        self.send(self.request(Method::GET, url)).await
    }

    /// Builds `<base>/api/<route>[/<document path>]`, encoding each path segment.
    fn endpoint(&self, route: &str, document: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty().push("api").push(route);
            if let Some(path) = document {
                segments.extend(path.trim_start_matches('/').split('/'));
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.execute(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_ack(&self, request: RequestBuilder) -> Result<Ack> {
        let body = self.execute(request).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Ack::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        let start = Instant::now();
        let response = self.client.execute(request).await?;
        let status = response.status();
        debug!("{} {} -> {} in {:?}", method, url.path(), status.as_u16(), start.elapsed());

        if status == StatusCode::UNAUTHORIZED {
            warn!("{} {} rejected credentials", method, url.path());
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match text.trim() {
                "" => status.canonical_reason().unwrap_or("unknown status").to_string(),
                trimmed => trimmed.to_string(),
            };
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
