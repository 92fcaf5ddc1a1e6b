use crate::domain::models::{SearchHit, Task};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

const WEEKLY_SUMMARY_PATH: &str = "weekly-summary";
const SEARCH_SUMMARY_PATH: &str = "search-summary";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SummaryRequest {
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Turns one week's tasks into prose.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate(&self, request: SummaryRequest) -> Result<String, InfraError>;
}

/// Finds past summaries similar to free text.
#[async_trait]
pub trait SummarySearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, InfraError>;
}

/// Client for the summary backend (`/weekly-summary`, `/search-summary`).
#[derive(Debug, Clone)]
pub struct ReqwestSummaryClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct WeeklySummaryResponse {
    summary: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    results: Option<Vec<SearchResultPayload>>,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResultPayload {
    summary: Option<String>,
    similarity: Option<f64>,
    label: Option<String>,
}

impl ReqwestSummaryClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, InfraError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: normalize_base_url(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid endpoint '{path}': {error}")))
    }

    async fn post_json<B>(&self, endpoint: Url, body: &B) -> Result<(StatusCode, String), reqwest::Error>
    where
        B: serde::Serialize + Sync,
    {
        let response = self.client.post(endpoint).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, InfraError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))
}

fn normalize_base_url(raw: &str) -> Result<Url, InfraError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid backend url '{raw}': {error}")))
}

pub(crate) fn http_failure(status: StatusCode, body: &str) -> String {
    let kind = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        "temporarily unavailable"
    } else {
        "rejected"
    };
    if body.trim().is_empty() {
        format!("{kind}: http {}", status.as_u16())
    } else {
        format!("{kind}: http {}; body={body}", status.as_u16())
    }
}

#[async_trait]
impl SummaryGenerator for ReqwestSummaryClient {
    async fn generate(&self, request: SummaryRequest) -> Result<String, InfraError> {
        if request.tasks.is_empty() {
            return Err(InfraError::Validation(
                "summary request needs at least one task".to_string(),
            ));
        }
        let endpoint = self.endpoint(WEEKLY_SUMMARY_PATH)?;

        let (status, body) = self
            .post_json(endpoint, &request)
            .await
            .map_err(|error| {
                InfraError::Generation(format!("network error while requesting summary: {error}"))
            })?;
        if !status.is_success() {
            return Err(InfraError::Generation(http_failure(status, &body)));
        }

        let parsed: WeeklySummaryResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Generation(format!("invalid summary payload: {error}; body={body}"))
        })?;
        parsed
            .summary
            .map(|summary| summary.trim().to_string())
            .filter(|summary| !summary.is_empty())
            .ok_or_else(|| InfraError::Generation("summary response did not include text".to_string()))
    }
}

#[async_trait]
impl SummarySearch for ReqwestSummaryClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, InfraError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let endpoint = self.endpoint(SEARCH_SUMMARY_PATH)?;

        let (status, body) = self
            .post_json(endpoint, &SearchRequest { query })
            .await
            .map_err(|error| {
                InfraError::Search(format!("network error while searching summaries: {error}"))
            })?;
        if !status.is_success() {
            return Err(InfraError::Search(http_failure(status, &body)));
        }

        let parsed: SearchResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Search(format!("invalid search payload: {error}; body={body}"))
        })?;
        Ok(parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|result| {
                let summary = result.summary?.trim().to_string();
                if summary.is_empty() {
                    return None;
                }
                Some(SearchHit {
                    summary,
                    similarity: result.similarity.unwrap_or(0.0).clamp(0.0, 1.0),
                    label: result
                        .label
                        .map(|label| label.trim().to_string())
                        .filter(|label| !label.is_empty())
                        .unwrap_or_else(|| "Unknown week".to_string()),
                })
            })
            .collect())
    }
}
