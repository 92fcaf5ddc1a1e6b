use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::weekly_summaries::{
    BackfillReport, ManualSummaryOutcome, NowProvider, RegenerationReport, RetryPolicy,
    WeeklySummaryService,
};
use crate::domain::models::{FocusLevel, SearchHit, Task, TaskDate, WeeklySummary};
use crate::domain::stats::{daily_trend, time_by_task, DailyFocusTrend, TaskTimeBreakdown};
use crate::domain::week::{week_range, WeekRange};
use crate::infrastructure::anthropic_client::AnthropicSummaryGenerator;
use crate::infrastructure::config::{
    AppConfig, GenerationConfig, LiveRegenerationScope, SummaryProvider,
};
use crate::infrastructure::credential_store::{resolve_api_key, ApiKeyStore, KeyringApiKeyStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::{KeyValueStore, SqliteKeyValueStore};
use crate::infrastructure::summary_client::{ReqwestSummaryClient, SummaryGenerator, SummarySearch};
use crate::infrastructure::summary_ledger::SummaryLedger;
use crate::infrastructure::task_repository::TaskRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct AppState {
    app_config: AppConfig,
    generation_config: GenerationConfig,
    tasks: TaskRepository,
    ledger: SummaryLedger,
    generator: Arc<dyn SummaryGenerator>,
    search: Arc<dyn SummarySearch>,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let generation_config = &bootstrap.generation_config;
        let timeout = generation_config
            .request_timeout_seconds
            .map(Duration::from_secs);
        let backend = Arc::new(ReqwestSummaryClient::new(
            &generation_config.backend_url,
            timeout,
        )?);
        let generator: Arc<dyn SummaryGenerator> = match generation_config.provider {
            SummaryProvider::Backend => Arc::clone(&backend) as Arc<dyn SummaryGenerator>,
            SummaryProvider::Anthropic => {
                let api_key = resolve_api_key(
                    |key| std::env::var(key).ok(),
                    &KeyringApiKeyStore::default(),
                )?;
                Arc::new(AnthropicSummaryGenerator::new(
                    generation_config.anthropic.clone(),
                    api_key,
                    timeout,
                )?)
            }
        };

        Ok(Self::from_bootstrap(bootstrap, generator, backend, Arc::new(Utc::now)))
    }

    /// Same workspace layout as [`AppState::new`] with caller-supplied ports and clock.
    pub fn with_ports(
        workspace_root: PathBuf,
        generator: Arc<dyn SummaryGenerator>,
        search: Arc<dyn SummarySearch>,
        now_provider: NowProvider,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Ok(Self::from_bootstrap(bootstrap, generator, search, now_provider))
    }

    fn from_bootstrap(
        bootstrap: BootstrapResult,
        generator: Arc<dyn SummaryGenerator>,
        search: Arc<dyn SummarySearch>,
        now_provider: NowProvider,
    ) -> Self {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::new(&bootstrap.database_path));
        Self {
            app_config: bootstrap.app_config,
            generation_config: bootstrap.generation_config,
            tasks: TaskRepository::new(Arc::clone(&store)),
            ledger: SummaryLedger::new(store),
            generator,
            search,
            now_provider,
        }
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, error = %error, "command failed");
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    fn summary_service(&self) -> WeeklySummaryService<dyn SummaryGenerator> {
        WeeklySummaryService::new(
            Arc::clone(&self.generator),
            self.ledger.clone(),
            self.app_config.timezone,
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: self.generation_config.max_attempts,
            base_delay_ms: self.generation_config.base_delay_ms,
        })
        .with_now_provider(Arc::clone(&self.now_provider))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub time_spent: u32,
    pub focus: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub time_spent: Option<u32>,
    pub focus: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskMutationResponse {
    pub tasks: Vec<Task>,
    pub regeneration: RegenerationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductivityStatsResponse {
    pub total_minutes: u64,
    pub by_task: Vec<TaskTimeBreakdown>,
    pub daily: Vec<DailyFocusTrend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewWeekResponse {
    pub is_new_week: bool,
    pub current_week: String,
    pub marker: Option<DateTime<Utc>>,
}

pub fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    state.tasks.load()
}

pub async fn add_task_impl(state: &AppState, input: NewTask) -> Result<TaskMutationResponse, InfraError> {
    let date = match input.date {
        Some(raw) => parse_task_date(&raw)?,
        None => TaskDate::Day(state.now().with_timezone(&state.app_config.timezone).date_naive()),
    };
    let task = Task {
        name: input.name.trim().to_string(),
        time_spent: input.time_spent,
        focus: parse_focus(&input.focus)?,
        date,
    };
    task.validate().map_err(InfraError::Validation)?;

    let previous = state.tasks.load()?;
    let mut current = previous.clone();
    current.push(task);
    state.log_info("add_task", &format!("added task; total={}", current.len()));
    persist_and_regenerate(state, &previous, current).await
}

pub async fn update_task_impl(
    state: &AppState,
    index: usize,
    patch: TaskPatch,
) -> Result<TaskMutationResponse, InfraError> {
    let previous = state.tasks.load()?;
    let mut current = previous.clone();
    let task = current
        .get_mut(index)
        .ok_or_else(|| InfraError::NotFound(format!("task index {index} not found")))?;

    if let Some(name) = patch.name {
        task.name = name.trim().to_string();
    }
    if let Some(time_spent) = patch.time_spent {
        task.time_spent = time_spent;
    }
    if let Some(focus) = patch.focus {
        task.focus = parse_focus(&focus)?;
    }
    if let Some(date) = patch.date {
        task.date = parse_task_date(&date)?;
    }
    task.validate().map_err(InfraError::Validation)?;

    state.log_info("update_task", &format!("updated task index={index}"));
    persist_and_regenerate(state, &previous, current).await
}

pub async fn delete_task_impl(state: &AppState, index: usize) -> Result<TaskMutationResponse, InfraError> {
    let previous = state.tasks.load()?;
    if index >= previous.len() {
        return Err(InfraError::NotFound(format!("task index {index} not found")));
    }
    let mut current = previous.clone();
    current.remove(index);
    state.log_info("delete_task", &format!("deleted task index={index}"));
    persist_and_regenerate(state, &previous, current).await
}

pub async fn clear_tasks_impl(state: &AppState) -> Result<TaskMutationResponse, InfraError> {
    let previous = state.tasks.load()?;
    state.log_info("clear_tasks", &format!("cleared {} tasks", previous.len()));
    persist_and_regenerate(state, &previous, Vec::new()).await
}

pub async fn run_backfill_impl(state: &AppState) -> Result<BackfillReport, InfraError> {
    let tasks = state.tasks.load()?;
    let report = state.summary_service().backfill(&tasks).await?;
    state.log_info(
        "run_backfill",
        &format!(
            "generated={} skipped_empty={} failed={}",
            report.generated.len(),
            report.skipped_empty.len(),
            report.failed.len()
        ),
    );
    Ok(report)
}

/// Manual summary for the week containing `date` (default: now).
pub async fn generate_summary_impl(
    state: &AppState,
    date: Option<String>,
) -> Result<ManualSummaryOutcome, InfraError> {
    let target = match date {
        Some(raw) => parse_task_date(&raw)?.instant(&state.app_config.timezone),
        None => state.now(),
    };
    let tasks = state.tasks.load()?;
    let outcome = state.summary_service().summarize_week(&tasks, target).await?;
    let label = match &outcome {
        ManualSummaryOutcome::NoTasks { label } | ManualSummaryOutcome::AlreadyExists { label, .. } => label,
        ManualSummaryOutcome::Generated { summary, .. } => &summary.label,
    };
    state.log_info("generate_summary", &format!("week={label}"));
    Ok(outcome)
}

pub fn list_summaries_impl(state: &AppState) -> Result<Vec<WeeklySummary>, InfraError> {
    Ok(state
        .ledger
        .history()?
        .into_iter()
        .map(|(label, summary)| WeeklySummary { label, summary })
        .collect())
}

pub async fn search_summaries_impl(state: &AppState, query: String) -> Result<Vec<SearchHit>, InfraError> {
    let hits = state.search.search(&query).await?;
    state.log_info("search_summaries", &format!("hits={}", hits.len()));
    Ok(hits)
}

pub fn productivity_stats_impl(state: &AppState) -> Result<ProductivityStatsResponse, InfraError> {
    let tasks = state.tasks.load()?;
    let by_task = time_by_task(&tasks);
    let daily = daily_trend(&tasks, &state.app_config.timezone);
    Ok(ProductivityStatsResponse {
        total_minutes: daily.iter().map(|day| day.total).sum(),
        by_task,
        daily,
    })
}

pub fn check_new_week_impl(state: &AppState) -> Result<NewWeekResponse, InfraError> {
    let current: WeekRange = week_range(state.now(), &state.app_config.timezone);
    Ok(NewWeekResponse {
        is_new_week: state.summary_service().is_new_week()?,
        current_week: current.label(),
        marker: state.ledger.load_marker()?,
    })
}

pub fn set_api_key_impl(store: &dyn ApiKeyStore, api_key: &str) -> Result<(), InfraError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(InfraError::Validation("api key must not be empty".to_string()));
    }
    store.save_api_key(api_key)?;
    tracing::info!(command = "set_api_key", "stored anthropic api key");
    Ok(())
}

async fn persist_and_regenerate(
    state: &AppState,
    previous: &[Task],
    current: Vec<Task>,
) -> Result<TaskMutationResponse, InfraError> {
    state.tasks.save(&current)?;
    let service = state.summary_service();
    let regeneration = match state.app_config.live_regeneration {
        LiveRegenerationScope::All => service.regenerate_all(&current).await?,
        LiveRegenerationScope::Affected => service.regenerate_affected(previous, &current).await?,
    };
    Ok(TaskMutationResponse {
        tasks: current,
        regeneration,
    })
}

fn parse_focus(value: &str) -> Result<FocusLevel, InfraError> {
    value.parse::<FocusLevel>().map_err(InfraError::Validation)
}

fn parse_task_date(value: &str) -> Result<TaskDate, InfraError> {
    TaskDate::parse(value).map_err(InfraError::Validation)
}
