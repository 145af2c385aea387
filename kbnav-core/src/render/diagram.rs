// Stage 2 collaborators: diagram block discovery and renderers

use crate::error::DiagramError;
use crate::render::math::escape_html;
use futures::future::BoxFuture;
use regex::Regex;
use reqwest::Client;
use scraper::Html;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

static DIAGRAM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)(<code\b[^>]*\bclass\s*=\s*"[^"]*\blanguage-mermaid\b[^"]*"[^>]*>)(.*?)(</code>)"#,
    )
    .expect("mermaid block pattern is valid")
});

static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-wide tiebreaker; every processed document takes a fresh one.
pub fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

pub fn diagram_id(ordinal: usize, generation: u64) -> String {
    format!("mermaid-{}-{}", ordinal, generation)
}

/// A diagram source block found in substituted HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBlock {
    /// Byte range of the whole element, open tag through close tag.
    pub start: usize,
    pub end: usize,
    /// Byte range of the inner HTML, between the open and close tags.
    pub inner_start: usize,
    pub inner_end: usize,
    pub open_tag: String,
    /// Text content with entities decoded.
    pub source: String,
}

/// Find every `<code class="language-mermaid">` element in document order.
pub fn locate_blocks(html: &str) -> Vec<LocatedBlock> {
    DIAGRAM_BLOCK
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let open = caps.get(1)?;
            let inner = caps.get(2)?;
            Some(LocatedBlock {
                start: whole.start(),
                end: whole.end(),
                inner_start: inner.start(),
                inner_end: inner.end(),
                open_tag: open.as_str().to_string(),
                source: decode_text(inner.as_str()),
            })
        })
        .collect()
}

fn decode_text(inner: &str) -> String {
    Html::parse_fragment(inner)
        .root_element()
        .text()
        .collect::<String>()
}

pub fn diagram_error_fragment(error: &DiagramError) -> String {
    format!(
        "<div class=\"diagram-error\">Mermaid Error: {}</div>",
        escape_html(&error.to_string())
    )
}

/// Renders one diagram source into markup. Each call is independent.
pub trait DiagramRenderer: Send + Sync {
    fn render(&self, id: String, source: String) -> BoxFuture<'static, Result<String, DiagramError>>;
}

/// Offline renderer: shows the escaped source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceRenderer;

impl DiagramRenderer for SourceRenderer {
    fn render(&self, id: String, source: String) -> BoxFuture<'static, Result<String, DiagramError>> {
        Box::pin(async move {
            if source.trim().is_empty() {
                return Err(DiagramError::EmptySource);
            }
            Ok(format!(
                "<pre class=\"diagram-source\" id=\"{}\">{}</pre>",
                id,
                escape_html(&source)
            ))
        })
    }
}

/// Renders through a Kroki server: `POST <base>/mermaid/svg`.
#[derive(Debug, Clone)]
pub struct KrokiRenderer {
    client: Client,
    endpoint: Url,
}

impl KrokiRenderer {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, DiagramError> {
        let base = Url::parse(base_url)
            .map_err(|e| DiagramError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;
        let mut endpoint = base.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| DiagramError::InvalidEndpoint(base_url.to_string()))?
            .pop_if_empty()
            .push("mermaid")
            .push("svg");

        let client = Client::builder()
            .user_agent(concat!("kbnav/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DiagramError::Request(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl DiagramRenderer for KrokiRenderer {
    fn render(&self, id: String, source: String) -> BoxFuture<'static, Result<String, DiagramError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            if source.trim().is_empty() {
                return Err(DiagramError::EmptySource);
            }
            debug!("Rendering diagram {} via {}", id, endpoint);

            let response = client
                .post(endpoint)
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(source)
                .send()
                .await
                .map_err(|e| DiagramError::Request(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| DiagramError::Request(e.to_string()))?;

            if !status.is_success() {
                return Err(DiagramError::Render {
                    status: status.as_u16(),
                    message: body.trim().to_string(),
                });
            }
            Ok(body)
        })
    }
}
