use crate::domain::models::Task;
use crate::infrastructure::config::AnthropicSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::summary_client::{
    build_http_client, http_failure, SummaryGenerator, SummaryRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Generates summaries by calling the Anthropic Messages API directly.
#[derive(Debug, Clone)]
pub struct AnthropicSummaryGenerator {
    client: Client,
    settings: AnthropicSettings,
    api_key: String,
}

#[derive(Debug, serde::Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, serde::Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct MessagesResponse {
    content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, serde::Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

impl AnthropicSummaryGenerator {
    pub fn new(
        settings: AnthropicSettings,
        api_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, InfraError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(InfraError::InvalidConfig("anthropic api key must not be empty".to_string()));
        }
        Ok(Self {
            client: build_http_client(timeout)?,
            settings,
            api_key,
        })
    }
}

pub fn build_coach_prompt(tasks: &[Task]) -> String {
    let items = tasks
        .iter()
        .map(|task| format!("- {} ({} min, focus {})", task.name, task.time_spent, task.focus))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are a productivity coach.\nTasks for the week:\n{items}\n\n\
         Write ONE paragraph summarizing overall productivity and give 2-3 actionable tips for next week."
    )
}

fn first_text_block(response: MessagesResponse) -> Option<String> {
    response
        .content
        .unwrap_or_default()
        .into_iter()
        .filter(|block| block.kind.as_deref().map_or(true, |kind| kind == "text"))
        .find_map(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[async_trait]
impl SummaryGenerator for AnthropicSummaryGenerator {
    async fn generate(&self, request: SummaryRequest) -> Result<String, InfraError> {
        if request.tasks.is_empty() {
            return Err(InfraError::Validation(
                "summary request needs at least one task".to_string(),
            ));
        }

        let payload = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: vec![Message {
                role: "user",
                content: build_coach_prompt(&request.tasks),
            }],
        };

        let response = self
            .client
            .post(&self.settings.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.settings.api_version)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                InfraError::Generation(format!("network error while calling messages api: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Generation(format!("failed reading messages response: {error}"))
        })?;
        if !status.is_success() {
            return Err(InfraError::Generation(http_failure(status, &body)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::Generation(format!("invalid messages payload: {error}; body={body}"))
        })?;
        first_text_block(parsed)
            .ok_or_else(|| InfraError::Generation("messages response did not include text".to_string()))
    }
}
