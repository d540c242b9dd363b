//! Search tool adapters
//!
//! The executor talks to remote content tools through the [`SearchAdapter`]
//! port. HTTP-backed adapters call the Bigdata search service; static
//! adapters keep the workflow runnable in demos and tests. Adapters classify
//! their own failures so the retry policy can act on them.

use crate::models::{EntityHint, EntityHintSource, ErrorKind, ToolParameters, ToolType};
use crate::planner::EntityResolver;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

/// One search request: the strategy's queries plus tool parameters.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub queries: &'a [String],
    pub parameters: &'a ToolParameters,
    pub max_results: usize,
}

/// A classified adapter failure. The kind drives the retry policy.
#[derive(Debug, Clone)]
pub struct SearchFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl SearchFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Port to one remote content tool.
#[async_trait::async_trait]
pub trait SearchAdapter: Send + Sync {
    fn tool_type(&self) -> ToolType;

    /// Run the search and return the combined result content.
    async fn search(&self, request: &SearchRequest<'_>) -> Result<String, SearchFailure>;

    /// Reset underlying connection state after an auth failure.
    fn reset(&self) {}
}

/// Adapter lookup by tool type.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ToolType, Arc<dyn SearchAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn SearchAdapter>) {
        self.adapters.insert(adapter.tool_type(), adapter);
    }

    pub fn get(&self, tool_type: ToolType) -> Option<Arc<dyn SearchAdapter>> {
        self.adapters.get(&tool_type).cloned()
    }

    pub fn tool_types(&self) -> Vec<ToolType> {
        self.adapters.keys().copied().collect()
    }
}

//
// ================= HTTP-backed adapters =================
//

/// Shared HTTP client for the Bigdata search service. The pooled client
/// sits behind a lock so an auth reset can rebuild it.
pub struct BigdataApiClient {
    client: RwLock<Client>,
    base_url: String,
    username: String,
    password: String,
}

impl BigdataApiClient {
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("BIGDATA_API_BASE_URL").ok()?;
        let username = env::var("BIGDATA_USERNAME").ok()?;
        let password = env::var("BIGDATA_PASSWORD").ok()?;

        Some(Self {
            client: RwLock::new(build_client()?),
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    /// Drop the pooled connections and start from a fresh client.
    pub fn reset_connection(&self) {
        if let Some(fresh) = build_client() {
            if let Ok(mut client) = self.client.write() {
                *client = fresh;
            }
        } else {
            warn!("Failed to rebuild HTTP client during auth reset");
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SearchFailure> {
        let url = format!("{}{}", self.base_url, path);
        let client = self
            .client
            .read()
            .map_err(|_| SearchFailure::new(ErrorKind::Unknown, "HTTP client unavailable"))?
            .clone();

        let response = client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Unknown
                };
                SearchFailure::new(kind, format!("Request to {} failed: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SearchFailure::new(
                classify_status(status),
                format!("{} returned {}: {}", path, status, detail),
            ));
        }

        response.json::<Value>().await.map_err(|e| {
            SearchFailure::new(
                ErrorKind::MalformedQuery,
                format!("Invalid JSON response from {}: {}", path, e),
            )
        })
    }
}

fn build_client() -> Option<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(30))
        .build()
        .ok()
}

/// Map an HTTP status to a retryable failure class.
fn classify_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::MalformedQuery,
        _ => ErrorKind::Unknown,
    }
}

/// HTTP adapter for one tool type, sharing the pooled API client.
pub struct BigdataSearchAdapter {
    api: Arc<BigdataApiClient>,
    tool: ToolType,
}

impl BigdataSearchAdapter {
    pub fn new(api: Arc<BigdataApiClient>, tool: ToolType) -> Self {
        Self { api, tool }
    }

    fn path(&self) -> &'static str {
        match self.tool {
            ToolType::News => "/search/news",
            ToolType::Transcripts => "/search/transcripts",
            ToolType::Filings => "/search/filings",
            ToolType::KnowledgeGraph => "/search/knowledge-graph",
        }
    }
}

#[async_trait::async_trait]
impl SearchAdapter for BigdataSearchAdapter {
    fn tool_type(&self) -> ToolType {
        self.tool
    }

    async fn search(&self, request: &SearchRequest<'_>) -> Result<String, SearchFailure> {
        let body = json!({
            "queries": request.queries,
            "max_results": request.max_results,
            "parameters": request.parameters,
        });

        let response = self.api.post_json(self.path(), &body).await?;
        let content = flatten_results(&response);

        if content.trim().is_empty() {
            return Err(SearchFailure::new(
                ErrorKind::EmptyResult,
                format!("{} search returned no content", self.tool),
            ));
        }

        Ok(content)
    }

    fn reset(&self) {
        self.api.reset_connection();
    }
}

/// Join whatever textual content the service returned into one document.
fn flatten_results(response: &Value) -> String {
    let results = match response.get("results").and_then(Value::as_array) {
        Some(results) => results,
        None => return response.as_str().unwrap_or_default().to_string(),
    };

    let mut out = String::new();
    for result in results {
        let text = result
            .get("content")
            .or_else(|| result.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if text.is_empty() {
            continue;
        }
        if let Some(headline) = result.get("headline").and_then(Value::as_str) {
            out.push_str(headline);
            out.push('\n');
        }
        out.push_str(text);
        out.push_str("\n\n");
    }
    out
}

/// Registry of HTTP adapters for every tool type, or `None` when the
/// service credentials are not configured.
pub fn registry_from_env() -> Option<AdapterRegistry> {
    let api = Arc::new(BigdataApiClient::from_env()?);
    let mut registry = AdapterRegistry::new();
    for tool in ToolType::ALL {
        registry.register(Arc::new(BigdataSearchAdapter::new(api.clone(), tool)));
    }
    Some(registry)
}

/// Entity resolution through the knowledge-graph endpoint. Failures produce
/// fewer hints, never an error; the planner treats discovery as advisory.
pub struct BigdataEntityResolver {
    api: Arc<BigdataApiClient>,
}

impl BigdataEntityResolver {
    pub fn new(api: Arc<BigdataApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl EntityResolver for BigdataEntityResolver {
    async fn resolve(&self, terms: &[String]) -> Vec<EntityHint> {
        let mut hints = Vec::new();
        for term in terms {
            let body = json!({"queries": [term], "max_results": 5});
            match self.api.post_json("/search/knowledge-graph", &body).await {
                Ok(response) => {
                    let matched_ids = extract_entity_ids(&response);
                    if matched_ids.is_empty() {
                        continue;
                    }
                    hints.push(EntityHint {
                        query: term.clone(),
                        matched_ids,
                        source: EntityHintSource::Discovered,
                    });
                }
                Err(e) => warn!(term = %term, error = %e, "Entity resolution failed"),
            }
        }
        hints
    }
}

fn extract_entity_ids(response: &Value) -> BTreeSet<String> {
    response
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|result| {
                    result
                        .get("entity_id")
                        .or_else(|| result.get("id"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Knowledge-graph entity resolver, or `None` when the service credentials
/// are not configured.
pub fn entity_resolver_from_env() -> Option<Arc<dyn EntityResolver>> {
    let api = Arc::new(BigdataApiClient::from_env()?);
    Some(Arc::new(BigdataEntityResolver::new(api)))
}

//
// ================= Static adapters =================
//

/// Canned-content adapter for demos and tests.
pub struct StaticSearchAdapter {
    tool: ToolType,
    content: String,
}

impl StaticSearchAdapter {
    pub fn new(tool: ToolType, content: impl Into<String>) -> Self {
        Self {
            tool,
            content: content.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchAdapter for StaticSearchAdapter {
    fn tool_type(&self) -> ToolType {
        self.tool
    }

    async fn search(&self, _request: &SearchRequest<'_>) -> Result<String, SearchFailure> {
        Ok(self.content.clone())
    }
}

/// Registry of static adapters with representative sample content, sized
/// so demo runs classify as high quality.
pub fn demo_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for tool in ToolType::ALL {
        let paragraph = format!(
            "Sample {} finding: revenue outlook, demand commentary, and segment detail \
             relevant to the research topic. ",
            tool
        );
        registry.register(Arc::new(StaticSearchAdapter::new(
            tool,
            paragraph.repeat(40),
        )));
    }
    registry
}
