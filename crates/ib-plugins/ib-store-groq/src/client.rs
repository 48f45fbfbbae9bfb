//! HTTP transport for the hosted document store: GROQ queries and
//! transactional mutations.

use std::time::Duration;

use ib_core::error::{AppError, Result};
use ib_core::query::BoundQuery;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct GroqConfig {
    pub project_id: String,
    pub dataset: String,
    /// Date-pinned API version, e.g. `2025-06-17`
    pub api_version: String,
    pub token: Option<SecretString>,
    /// Serve reads from the edge cache. Writes always go to the live API.
    pub use_cdn: bool,
    pub timeout: Duration,
}

impl GroqConfig {
    pub fn new(project_id: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            api_version: "2025-06-17".into(),
            token: None,
            use_cdn: false,
            timeout: Duration::from_secs(10),
        }
    }

    fn base_url(&self, cdn: bool) -> String {
        let host = if cdn { "apicdn" } else { "api" };
        format!(
            "https://{}.{host}.sanity.io/v{}",
            self.project_id,
            self.api_version.trim_start_matches('v')
        )
    }

    pub fn query_url(&self) -> String {
        format!("{}/data/query/{}", self.base_url(self.use_cdn), self.dataset)
    }

    pub fn mutate_url(&self) -> String {
        format!("{}/data/mutate/{}", self.base_url(false), self.dataset)
    }
}

/// One entry of a mutation transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    Create(Value),
    CreateOrReplace(Value),
    Delete { id: String },
    Patch { id: String, set: Value },
}

#[derive(Debug, Serialize)]
struct Transaction<'a> {
    mutations: &'a [Mutation],
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutationResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationResult {
    pub id: String,
    #[serde(default)]
    pub document: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

pub struct GroqClient {
    http: reqwest::Client,
    config: GroqConfig,
}

impl GroqClient {
    pub fn new(config: GroqConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GroqConfig {
        &self.config
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    #[instrument(name = "groq_query", skip_all, fields(query = %bound.query))]
    pub async fn query<T: DeserializeOwned>(&self, bound: &BoundQuery) -> Result<T> {
        let request = self
            .http
            .get(self.config.query_url())
            .query(&bound.url_params());
        let response = self.authorize(request).send().await.map_err(transport)?;
        let body: QueryResponse<T> = read_json(response).await?;
        debug!("query answered");
        Ok(body.result)
    }

    /// Commits `mutations` as one transaction and returns the touched documents.
    #[instrument(name = "groq_mutate", skip_all, fields(count = mutations.len()))]
    pub async fn mutate(&self, mutations: &[Mutation]) -> Result<Vec<MutationResult>> {
        let request = self
            .http
            .post(self.config.mutate_url())
            .query(&[
                ("returnIds", "true"),
                ("returnDocuments", "true"),
                ("visibility", "sync"),
            ])
            .json(&Transaction { mutations });
        let response = self.authorize(request).send().await.map_err(transport)?;
        let body: MutateResponse = read_json(response).await?;
        debug!(results = body.results.len(), "mutation committed");
        Ok(body.results)
    }
}

fn transport(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Remote("document store timed out".into())
    } else {
        AppError::Remote(format!("document store unreachable: {err}"))
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(transport)?;
    if !status.is_success() {
        return Err(status_error(status, &bytes));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn status_error(status: StatusCode, body: &[u8]) -> AppError {
    let detail = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.description)
        .unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
        StatusCode::CONFLICT => AppError::Conflict(detail),
        StatusCode::BAD_REQUEST => AppError::Validation(detail),
        _ => AppError::Remote(detail),
    }
}
