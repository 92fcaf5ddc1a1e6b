use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const GENERATION_JSON: &str = "generation.json";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000/";
pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-sonnet-20240229";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LiveRegenerationScope {
    /// Every week holding tasks, whether or not it changed.
    #[default]
    All,
    /// Only weeks whose task content differs from before the mutation.
    Affected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SummaryProvider {
    #[default]
    Backend,
    Anthropic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub timezone: Tz,
    pub live_regeneration: LiveRegenerationScope,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            live_regeneration: LiveRegenerationScope::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicSettings {
    pub endpoint: String,
    pub model: String,
    pub api_version: String,
    pub max_tokens: u32,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ANTHROPIC_ENDPOINT.to_string(),
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            api_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub provider: SummaryProvider,
    pub backend_url: String,
    pub anthropic: AnthropicSettings,
    pub max_attempts: u8,
    pub base_delay_ms: u64,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: SummaryProvider::Backend,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            anthropic: AnthropicSettings::default(),
            max_attempts: 1,
            base_delay_ms: 200,
            request_timeout_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppFile {
    timezone: Option<String>,
    live_regeneration: Option<LiveRegenerationScope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationFile {
    provider: Option<SummaryProvider>,
    backend_url: Option<String>,
    anthropic: Option<AnthropicFile>,
    retry: Option<RetryFile>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnthropicFile {
    endpoint: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryFile {
    max_attempts: Option<u8>,
    base_delay_ms: Option<u64>,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "timezone": "UTC",
                "liveRegeneration": "all"
            }),
        ),
        (
            GENERATION_JSON,
            serde_json::json!({
                "schema": 1,
                "provider": "backend",
                "backendUrl": DEFAULT_BACKEND_URL,
                "anthropic": {
                    "endpoint": DEFAULT_ANTHROPIC_ENDPOINT,
                    "model": DEFAULT_ANTHROPIC_MODEL,
                    "apiVersion": DEFAULT_ANTHROPIC_VERSION,
                    "maxTokens": DEFAULT_MAX_TOKENS
                },
                "retry": {
                    "maxAttempts": 1,
                    "baseDelayMs": 200
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{value}': {error}")))
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    load_app_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_app_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let file: AppFile = serde_json::from_value(read_config(&config_dir.join(APP_JSON))?)?;
    let timezone = match non_empty(lookup("TRACKER_TIMEZONE")).or(non_empty(file.timezone)) {
        Some(raw) => parse_timezone(&raw)?,
        None => Tz::UTC,
    };
    Ok(AppConfig {
        timezone,
        live_regeneration: file.live_regeneration.unwrap_or_default(),
    })
}

pub fn load_generation_config(config_dir: &Path) -> Result<GenerationConfig, InfraError> {
    load_generation_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

pub fn load_generation_config_with_lookup<F>(
    config_dir: &Path,
    lookup: F,
) -> Result<GenerationConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let file: GenerationFile =
        serde_json::from_value(read_config(&config_dir.join(GENERATION_JSON))?)?;
    let defaults = GenerationConfig::default();
    let anthropic = file.anthropic.map_or_else(AnthropicSettings::default, |settings| {
        AnthropicSettings {
            endpoint: non_empty(settings.endpoint).unwrap_or(defaults.anthropic.endpoint.clone()),
            model: non_empty(settings.model).unwrap_or(defaults.anthropic.model.clone()),
            api_version: non_empty(settings.api_version)
                .unwrap_or(defaults.anthropic.api_version.clone()),
            max_tokens: settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    });
    let (max_attempts, base_delay_ms) = match file.retry {
        Some(retry) => (
            retry.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            retry.base_delay_ms.unwrap_or(defaults.base_delay_ms),
        ),
        None => (defaults.max_attempts, defaults.base_delay_ms),
    };

    Ok(GenerationConfig {
        provider: file.provider.unwrap_or_default(),
        backend_url: non_empty(lookup("TRACKER_BACKEND_URL"))
            .or(non_empty(file.backend_url))
            .unwrap_or(defaults.backend_url),
        anthropic,
        max_attempts,
        base_delay_ms,
        request_timeout_seconds: file.request_timeout_seconds.filter(|seconds| *seconds > 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        ensure_default_configs(dir.path()).expect("write defaults");
        dir
    }

    #[test]
    fn defaults_load_cleanly() {
        let dir = config_dir();
        let app = load_app_config_with_lookup(dir.path(), |_| None).expect("app config");
        let generation =
            load_generation_config_with_lookup(dir.path(), |_| None).expect("generation config");

        assert_eq!(app, AppConfig::default());
        assert_eq!(generation, GenerationConfig::default());
    }

    #[test]
    fn ensure_defaults_keeps_user_edits() {
        let dir = config_dir();
        fs::write(
            dir.path().join(APP_JSON),
            r#"{"schema": 1, "timezone": "Europe/Berlin", "liveRegeneration": "affected"}"#,
        )
        .expect("edit app.json");
        ensure_default_configs(dir.path()).expect("rerun defaults");

        let app = load_app_config_with_lookup(dir.path(), |_| None).expect("app config");
        assert_eq!(app.timezone, Tz::Europe__Berlin);
        assert_eq!(app.live_regeneration, LiveRegenerationScope::Affected);
    }

    #[test]
    fn environment_overrides_take_precedence() {
        let dir = config_dir();
        let lookup = |key: &str| match key {
            "TRACKER_TIMEZONE" => Some("Asia/Tokyo".to_string()),
            "TRACKER_BACKEND_URL" => Some(" http://summaries.internal:9000/ ".to_string()),
            _ => None,
        };

        let app = load_app_config_with_lookup(dir.path(), lookup).expect("app config");
        let generation =
            load_generation_config_with_lookup(dir.path(), lookup).expect("generation config");
        assert_eq!(app.timezone, Tz::Asia__Tokyo);
        assert_eq!(generation.backend_url, "http://summaries.internal:9000/");
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = config_dir();
        fs::write(dir.path().join(GENERATION_JSON), r#"{"schema": 2}"#).expect("write");
        match load_generation_config_with_lookup(dir.path(), |_| None) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let dir = config_dir();
        fs::write(
            dir.path().join(APP_JSON),
            r#"{"schema": 1, "timezone": "Mars/Olympus"}"#,
        )
        .expect("write");
        assert!(load_app_config_with_lookup(dir.path(), |_| None).is_err());
    }

    #[test]
    fn retry_attempts_never_drop_below_one() {
        let dir = config_dir();
        fs::write(
            dir.path().join(GENERATION_JSON),
            r#"{"schema": 1, "provider": "anthropic", "retry": {"maxAttempts": 0}}"#,
        )
        .expect("write");
        let generation =
            load_generation_config_with_lookup(dir.path(), |_| None).expect("generation config");
        assert_eq!(generation.provider, SummaryProvider::Anthropic);
        assert_eq!(generation.max_attempts, 1);
    }
}
