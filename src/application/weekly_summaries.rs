use crate::domain::models::{Task, WeeklySummary};
use crate::domain::week::{is_new_week, week_range, WeekRange};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::summary_client::{SummaryGenerator, SummaryRequest};
use crate::infrastructure::summary_ledger::SummaryLedger;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::time::{sleep, Duration as TokioDuration};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 200,
        }
    }
}

/// One week's tasks, in task-list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekBucket {
    pub range: WeekRange,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeekFailure {
    pub label: String,
    pub message: String,
}

/// Shown once after a backfill pass: the last week it processed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeekNotification {
    pub range: WeekRange,
    pub label: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackfillReport {
    pub now: DateTime<Utc>,
    pub pending: Vec<String>,
    pub generated: Vec<WeeklySummary>,
    pub skipped_empty: Vec<String>,
    pub failed: Vec<WeekFailure>,
    pub marker: Option<DateTime<Utc>>,
    pub notification: Option<WeekNotification>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RegenerationReport {
    pub generated: Vec<WeeklySummary>,
    pub failed: Vec<WeekFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ManualSummaryOutcome {
    NoTasks { label: String },
    AlreadyExists { label: String, summary: String },
    Generated { range: WeekRange, summary: WeeklySummary },
}

/// Groups tasks into Monday–Sunday buckets, oldest week first.
pub fn bucket_by_week(tasks: &[Task], tz: &Tz) -> Vec<WeekBucket> {
    let mut buckets: BTreeMap<NaiveDate, WeekBucket> = BTreeMap::new();
    for task in tasks {
        let range = week_range(task.date.instant(tz), tz);
        buckets
            .entry(range.start_date)
            .or_insert_with(|| WeekBucket {
                range,
                tasks: Vec::new(),
            })
            .tasks
            .push(task.clone());
    }
    buckets.into_values().collect()
}

/// Buckets of `current` whose task content differs from the same week in `previous`.
pub fn affected_buckets(previous: &[Task], current: &[Task], tz: &Tz) -> Vec<WeekBucket> {
    let before = bucket_by_week(previous, tz)
        .into_iter()
        .map(|bucket| (bucket.range.start_date, bucket.tasks))
        .collect::<BTreeMap<_, _>>();
    bucket_by_week(current, tz)
        .into_iter()
        .filter(|bucket| before.get(&bucket.range.start_date) != Some(&bucket.tasks))
        .collect()
}

pub fn tasks_in_range(tasks: &[Task], range: &WeekRange, tz: &Tz) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| range.contains(task.date.instant(tz)))
        .cloned()
        .collect()
}

/// Completed weeks between the marker (or the first task) and `now` that have
/// no summary yet, oldest first.
///
/// Without a marker the walk starts at the earliest task itself so a first week
/// holding only a Sunday task is not stepped over.
pub fn pending_weeks<F>(
    tasks: &[Task],
    marker: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    tz: &Tz,
    has_summary: F,
) -> Vec<WeekRange>
where
    F: Fn(&str) -> bool,
{
    let cursor = match marker {
        Some(marker) => marker + Duration::days(1),
        None => tasks
            .iter()
            .map(|task| task.date.instant(tz))
            .min()
            .unwrap_or(now),
    };

    let mut pending = Vec::new();
    let mut range = week_range(cursor, tz);
    while range.end < now {
        if !has_summary(&range.label()) {
            pending.push(range);
        }
        range = range.following(tz);
    }
    pending
}

pub struct WeeklySummaryService<G>
where
    G: SummaryGenerator + ?Sized,
{
    generator: Arc<G>,
    ledger: SummaryLedger,
    timezone: Tz,
    retry_policy: RetryPolicy,
    now_provider: NowProvider,
}

impl<G> WeeklySummaryService<G>
where
    G: SummaryGenerator + ?Sized,
{
    pub fn new(generator: Arc<G>, ledger: SummaryLedger, timezone: Tz) -> Self {
        Self {
            generator,
            ledger,
            timezone,
            retry_policy: RetryPolicy::default(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Reads the clock at call time.
    pub fn is_new_week(&self) -> Result<bool, InfraError> {
        let marker = self.ledger.load_marker()?;
        Ok(is_new_week(marker, (self.now_provider)(), &self.timezone))
    }

    /// Startup reconciliation: fills in summaries for completed weeks that
    /// hold tasks and have none yet.
    ///
    /// A failed week is skipped and the marker stays put so the next run
    /// retries it; weeks already written are not generated again.
    pub async fn backfill(&self, tasks: &[Task]) -> Result<BackfillReport, InfraError> {
        let now = (self.now_provider)();
        let marker = self.ledger.load_marker()?;
        let existing = self.ledger.load_all()?;
        let mut queue: VecDeque<WeekRange> = pending_weeks(tasks, marker, now, &self.timezone, |label| {
            existing
                .get(label)
                .map(|summary| !summary.is_empty())
                .unwrap_or(false)
        })
        .into();

        tracing::info!(
            now = %now,
            marker = ?marker,
            task_count = tasks.len(),
            pending = queue.len(),
            "starting summary backfill"
        );

        let mut report = BackfillReport {
            now,
            pending: queue.iter().map(WeekRange::label).collect(),
            generated: Vec::new(),
            skipped_empty: Vec::new(),
            failed: Vec::new(),
            marker,
            notification: None,
        };
        let mut last_processed: Option<(WeekRange, Option<String>)> = None;

        while let Some(range) = queue.pop_front() {
            let label = range.label();
            let week_tasks = tasks_in_range(tasks, &range, &self.timezone);
            if week_tasks.is_empty() {
                tracing::info!(label = %label, "skipping week without tasks");
                report.skipped_empty.push(label);
                last_processed = Some((range, None));
                continue;
            }

            match self.generate_and_store(&label, week_tasks).await {
                Ok(summary) => {
                    report.generated.push(WeeklySummary {
                        label,
                        summary: summary.clone(),
                    });
                    last_processed = Some((range, Some(summary)));
                }
                Err(error) => {
                    tracing::warn!(label = %label, error = %error, "summary generation failed; continuing");
                    report.failed.push(WeekFailure {
                        label,
                        message: error.to_string(),
                    });
                    last_processed = Some((range, None));
                }
            }
        }

        if let Some((range, summary)) = last_processed {
            if report.failed.is_empty() {
                self.ledger.save_marker(range.end)?;
                report.marker = Some(range.end);
                tracing::info!(marker = %range.end, "advanced last completed week marker");
            } else {
                tracing::warn!(
                    failed = report.failed.len(),
                    "keeping last completed week marker; failed weeks retry on next startup"
                );
            }
            report.notification = Some(WeekNotification {
                label: range.label(),
                range,
                summary,
            });
        }

        Ok(report)
    }

    /// Regenerates every week that has tasks, overwriting existing entries.
    pub async fn regenerate_all(&self, tasks: &[Task]) -> Result<RegenerationReport, InfraError> {
        self.regenerate_buckets(bucket_by_week(tasks, &self.timezone)).await
    }

    /// Regenerates only weeks whose tasks changed between the two lists.
    pub async fn regenerate_affected(
        &self,
        previous: &[Task],
        current: &[Task],
    ) -> Result<RegenerationReport, InfraError> {
        self.regenerate_buckets(affected_buckets(previous, current, &self.timezone))
            .await
    }

    async fn regenerate_buckets(&self, buckets: Vec<WeekBucket>) -> Result<RegenerationReport, InfraError> {
        let mut report = RegenerationReport::default();
        for bucket in buckets {
            let label = bucket.range.label();
            match self.generate_and_store(&label, bucket.tasks).await {
                Ok(summary) => report.generated.push(WeeklySummary { label, summary }),
                Err(InfraError::Generation(message)) => {
                    tracing::warn!(label = %label, error = %message, "live regeneration failed; continuing");
                    report.failed.push(WeekFailure { label, message });
                }
                Err(error) => return Err(error),
            }
        }
        tracing::info!(
            generated = report.generated.len(),
            failed = report.failed.len(),
            "live regeneration finished"
        );
        Ok(report)
    }

    /// On-demand summary for the week containing `target`.
    pub async fn summarize_week(
        &self,
        tasks: &[Task],
        target: DateTime<Utc>,
    ) -> Result<ManualSummaryOutcome, InfraError> {
        let range = week_range(target, &self.timezone);
        let label = range.label();
        let week_tasks = tasks_in_range(tasks, &range, &self.timezone);
        if week_tasks.is_empty() {
            return Ok(ManualSummaryOutcome::NoTasks { label });
        }
        if let Some(summary) = self.ledger.get(&label)?.filter(|summary| !summary.is_empty()) {
            return Ok(ManualSummaryOutcome::AlreadyExists { label, summary });
        }

        let summary = self.generate_and_store(&label, week_tasks).await?;
        self.ledger.save_marker(range.end)?;
        Ok(ManualSummaryOutcome::Generated {
            range,
            summary: WeeklySummary { label, summary },
        })
    }

    async fn generate_and_store(&self, label: &str, tasks: Vec<Task>) -> Result<String, InfraError> {
        let task_count = tasks.len();
        let summary = self
            .generate_with_retry(SummaryRequest {
                tasks,
                label: Some(label.to_string()),
            })
            .await?;
        self.ledger.put(label, &summary)?;
        tracing::info!(label = %label, task_count, "stored weekly summary");
        Ok(summary)
    }

    async fn generate_with_retry(&self, request: SummaryRequest) -> Result<String, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.generator.generate(request.clone()).await {
                Ok(summary) => return Ok(summary),
                Err(error) if self.should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    tracing::debug!(attempt, delay_ms = delay, error = %error, "retrying summary generation");
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn should_retry(&self, error: &InfraError) -> bool {
        match error {
            InfraError::Generation(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("network error")
                    || message.contains("timed out")
                    || message.contains("temporarily unavailable")
                    || message.contains("connection reset")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FocusLevel, TaskDate};
    use crate::infrastructure::kv_store::InMemoryKeyValueStore;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeSummaryGenerator {
        calls: Mutex<Vec<SummaryRequest>>,
        failures: Mutex<HashMap<String, VecDeque<String>>>,
        attempts: AtomicUsize,
    }

    impl FakeSummaryGenerator {
        fn failing(label: &str, messages: &[&str]) -> Self {
            let generator = Self::default();
            generator.failures.lock().expect("failures lock").insert(
                label.to_string(),
                messages.iter().map(|message| message.to_string()).collect(),
            );
            generator
        }

        fn calls(&self) -> Vec<SummaryRequest> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl SummaryGenerator for FakeSummaryGenerator {
        async fn generate(&self, request: SummaryRequest) -> Result<String, InfraError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let label = request.label.clone().unwrap_or_default();
            if let Some(message) = self
                .failures
                .lock()
                .expect("failures lock")
                .get_mut(&label)
                .and_then(VecDeque::pop_front)
            {
                return Err(InfraError::Generation(message));
            }
            let minutes: u32 = request.tasks.iter().map(|task| task.time_spent).sum();
            let summary = format!("{label}: {} tasks, {minutes} min", request.tasks.len());
            self.calls.lock().expect("calls lock").push(request);
            Ok(summary)
        }
    }

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(name: &str, minutes: u32, date: &str) -> Task {
        Task {
            name: name.to_string(),
            time_spent: minutes,
            focus: FocusLevel::Medium,
            date: TaskDate::parse(date).expect("valid date"),
        }
    }

    fn service(
        generator: Arc<FakeSummaryGenerator>,
        now: &str,
    ) -> (SummaryLedger, WeeklySummaryService<FakeSummaryGenerator>) {
        let ledger = SummaryLedger::new(Arc::new(InMemoryKeyValueStore::default()));
        let now = utc(now);
        let service = WeeklySummaryService::new(generator, ledger.clone(), Tz::UTC)
            .with_retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay_ms: 1,
            })
            .with_now_provider(Arc::new(move || now));
        (ledger, service)
    }

    const FIRST_WEEK: &str = "Mon 5 May 2025 – Sun 11 May 2025";

    #[tokio::test]
    async fn backfill_generates_the_completed_week_once() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let tasks = vec![task("Plan", 30, "2025-05-05"), task("Review", 15, "2025-05-11")];

        let report = service.backfill(&tasks).await.expect("backfill");

        assert_eq!(report.pending, vec![FIRST_WEEK.to_string()]);
        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tasks, tasks);
        assert_eq!(calls[0].label.as_deref(), Some(FIRST_WEEK));

        let marker = utc("2025-05-11T23:59:59.999Z");
        assert_eq!(ledger.load_marker().expect("marker"), Some(marker));
        assert_eq!(report.marker, Some(marker));
        let notification = report.notification.expect("notification");
        assert_eq!(notification.label, FIRST_WEEK);
        assert_eq!(
            notification.summary.as_deref(),
            Some("Mon 5 May 2025 – Sun 11 May 2025: 2 tasks, 45 min")
        );
        assert!(ledger.contains(FIRST_WEEK).expect("ledger lookup"));
    }

    #[tokio::test]
    async fn backfill_waits_for_the_running_week_to_finish() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-13T09:00:00Z");
        let marker = utc("2025-05-11T23:59:59.999Z");
        ledger.save_marker(marker).expect("seed marker");
        let tasks = vec![task("Plan", 30, "2025-05-05"), task("Review", 15, "2025-05-11")];

        let report = service.backfill(&tasks).await.expect("backfill");

        assert!(report.pending.is_empty());
        assert!(generator.calls().is_empty());
        assert!(report.notification.is_none());
        assert_eq!(ledger.load_marker().expect("marker"), Some(marker));
    }

    #[tokio::test]
    async fn backfill_skips_weeks_without_tasks() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-28T09:00:00Z");
        let tasks = vec![task("W1", 20, "2025-05-06"), task("W3", 40, "2025-05-21")];

        let report = service.backfill(&tasks).await.expect("backfill");

        assert_eq!(report.pending.len(), 3);
        assert_eq!(report.skipped_empty, vec!["Mon 12 May 2025 – Sun 18 May 2025".to_string()]);
        assert_eq!(
            ledger.load_all().expect("ledger").keys().cloned().collect::<Vec<_>>(),
            vec![
                "Mon 5 May 2025 – Sun 11 May 2025".to_string(),
                "Mon 19 May 2025 – Sun 25 May 2025".to_string(),
            ]
        );
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(
            ledger.load_marker().expect("marker"),
            Some(utc("2025-05-25T23:59:59.999Z"))
        );
    }

    #[tokio::test]
    async fn last_week_skipped_for_emptiness_still_advances_marker() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let tasks = vec![task("Only", 20, "2025-05-06")];

        let report = service.backfill(&tasks).await.expect("backfill");

        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.skipped_empty.len(), 1);
        let notification = report.notification.expect("notification");
        assert_eq!(notification.label, "Mon 12 May 2025 – Sun 18 May 2025");
        assert_eq!(notification.summary, None);
        assert_eq!(
            ledger.load_marker().expect("marker"),
            Some(utc("2025-05-18T23:59:59.999Z"))
        );
    }

    #[tokio::test]
    async fn repeated_backfill_is_idempotent() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-28T09:00:00Z");
        let tasks = vec![task("W1", 20, "2025-05-06"), task("W3", 40, "2025-05-21")];

        service.backfill(&tasks).await.expect("first backfill");
        let second = service.backfill(&tasks).await.expect("second backfill");

        assert!(second.pending.is_empty());
        assert_eq!(generator.calls().len(), 2);
        assert_eq!(ledger.load_all().expect("ledger").len(), 2);
    }

    #[tokio::test]
    async fn existing_entries_are_not_regenerated_by_backfill() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        ledger.put(FIRST_WEEK, "hand written").expect("seed entry");

        let report = service
            .backfill(&[task("Plan", 30, "2025-05-05")])
            .await
            .expect("backfill");

        assert!(report.pending.is_empty());
        assert!(generator.calls().is_empty());
        assert_eq!(ledger.get(FIRST_WEEK).expect("get"), Some("hand written".to_string()));
    }

    #[tokio::test]
    async fn first_week_with_only_a_sunday_task_is_not_skipped() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (_, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");

        let report = service
            .backfill(&[task("Weekend", 25, "2025-05-11")])
            .await
            .expect("backfill");

        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.generated[0].label, FIRST_WEEK);
    }

    #[tokio::test]
    async fn failed_week_is_skipped_and_marker_held_back() {
        let generator = Arc::new(FakeSummaryGenerator::failing(
            FIRST_WEEK,
            &["network error while requesting summary: refused"],
        ));
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-28T09:00:00Z");
        let tasks = vec![task("W1", 20, "2025-05-06"), task("W3", 40, "2025-05-21")];

        let first = service.backfill(&tasks).await.expect("first backfill");
        assert_eq!(first.failed.len(), 1);
        assert_eq!(first.failed[0].label, FIRST_WEEK);
        assert_eq!(first.generated.len(), 1);
        assert_eq!(ledger.load_marker().expect("marker"), None);
        assert!(first.notification.is_some());

        let second = service.backfill(&tasks).await.expect("second backfill");
        assert_eq!(second.generated.len(), 1);
        assert_eq!(second.generated[0].label, FIRST_WEEK);
        assert!(second.failed.is_empty());
        // W2 is still pending (empty weeks never get an entry) and is the last one processed.
        assert_eq!(
            ledger.load_marker().expect("marker"),
            Some(utc("2025-05-18T23:59:59.999Z"))
        );
        assert_eq!(ledger.load_all().expect("ledger").len(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_policy() {
        let generator = Arc::new(FakeSummaryGenerator::failing(
            FIRST_WEEK,
            &["temporarily unavailable: http 503"],
        ));
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let service = service.with_retry_policy(RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
        });

        let report = service
            .backfill(&[task("Plan", 30, "2025-05-05")])
            .await
            .expect("backfill");

        assert!(report.failed.is_empty());
        assert_eq!(generator.attempts.load(Ordering::SeqCst), 2);
        assert!(ledger.contains(FIRST_WEEK).expect("ledger lookup"));
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let generator = Arc::new(FakeSummaryGenerator::failing(
            FIRST_WEEK,
            &["rejected: http 422", "rejected: http 422"],
        ));
        let (_, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let service = service.with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        });

        let report = service
            .backfill(&[task("Plan", 30, "2025-05-05")])
            .await
            .expect("backfill");

        assert_eq!(report.failed.len(), 1);
        assert_eq!(generator.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backfill_without_tasks_does_nothing() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");

        let report = service.backfill(&[]).await.expect("backfill");

        assert!(report.pending.is_empty());
        assert!(report.notification.is_none());
        assert_eq!(ledger.load_marker().expect("marker"), None);
    }

    #[tokio::test]
    async fn live_regeneration_overwrites_unchanged_buckets() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        ledger.put(FIRST_WEEK, "stale").expect("seed entry");
        let mut tasks = vec![task("Plan", 30, "2025-05-05"), task("Later", 10, "2025-05-14")];

        service.regenerate_all(&tasks).await.expect("first regeneration");
        tasks.push(task("Review", 15, "2025-05-07"));
        let report = service.regenerate_all(&tasks).await.expect("second regeneration");

        let labels = report
            .generated
            .iter()
            .map(|summary| summary.label.as_str())
            .collect::<Vec<_>>();
        assert_eq!(labels, vec![FIRST_WEEK, "Mon 12 May 2025 – Sun 18 May 2025"]);
        assert_eq!(generator.calls().len(), 4);
        assert_eq!(generator.calls()[2].tasks.len(), 2);
        assert_eq!(
            ledger.get(FIRST_WEEK).expect("get"),
            Some("Mon 5 May 2025 – Sun 11 May 2025: 2 tasks, 45 min".to_string())
        );
    }

    #[tokio::test]
    async fn affected_regeneration_only_touches_changed_weeks() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (_, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let before = vec![task("Plan", 30, "2025-05-05"), task("Later", 10, "2025-05-14")];
        let mut after = before.clone();
        after[1].time_spent = 20;

        let report = service
            .regenerate_affected(&before, &after)
            .await
            .expect("regeneration");

        assert_eq!(report.generated.len(), 1);
        assert_eq!(report.generated[0].label, "Mon 12 May 2025 – Sun 18 May 2025");
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn live_regeneration_continues_past_failures() {
        let generator = Arc::new(FakeSummaryGenerator::failing(FIRST_WEEK, &["rejected: http 400"]));
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let tasks = vec![task("Plan", 30, "2025-05-05"), task("Later", 10, "2025-05-14")];

        let report = service.regenerate_all(&tasks).await.expect("regeneration");

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.generated.len(), 1);
        assert!(!ledger.contains(FIRST_WEEK).expect("lookup"));
    }

    #[tokio::test]
    async fn manual_summary_reports_empty_and_existing_weeks() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(Arc::clone(&generator), "2025-05-20T09:00:00Z");
        let tasks = vec![task("Plan", 30, "2025-05-05")];

        let empty = service
            .summarize_week(&tasks, utc("2025-05-14T12:00:00Z"))
            .await
            .expect("empty week");
        assert_eq!(
            empty,
            ManualSummaryOutcome::NoTasks {
                label: "Mon 12 May 2025 – Sun 18 May 2025".to_string()
            }
        );

        let generated = service
            .summarize_week(&tasks, utc("2025-05-07T12:00:00Z"))
            .await
            .expect("generate");
        assert!(matches!(generated, ManualSummaryOutcome::Generated { .. }));
        assert_eq!(
            ledger.load_marker().expect("marker"),
            Some(utc("2025-05-11T23:59:59.999Z"))
        );

        let existing = service
            .summarize_week(&tasks, utc("2025-05-07T12:00:00Z"))
            .await
            .expect("existing");
        assert!(matches!(existing, ManualSummaryOutcome::AlreadyExists { .. }));
        assert_eq!(generator.calls().len(), 1);
    }

    #[test]
    fn is_new_week_reads_marker_and_clock() {
        let generator = Arc::new(FakeSummaryGenerator::default());
        let (ledger, service) = service(generator, "2025-05-13T09:00:00Z");
        assert!(service.is_new_week().expect("no marker"));

        ledger
            .save_marker(utc("2025-05-11T23:59:59.999Z"))
            .expect("save marker");
        assert!(service.is_new_week().expect("marker last week"));

        ledger
            .save_marker(utc("2025-05-12T10:00:00Z"))
            .expect("save marker");
        assert!(!service.is_new_week().expect("marker this week"));
    }

    fn day_offsets() -> impl Strategy<Value = Vec<u16>> {
        proptest::collection::vec(0u16..120u16, 1..12)
    }

    // Feature: weekly-summaries, Property 4: backfill never writes the same label twice and a rerun generates nothing
    proptest! {
        #[test]
        fn property4_backfill_is_idempotent(offsets in day_offsets(), now_offset in 0u16..160u16) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            runtime.block_on(async move {
                let origin = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
                let tasks = offsets
                    .iter()
                    .map(|offset| Task {
                        name: format!("task-{offset}"),
                        time_spent: u32::from(*offset) + 1,
                        focus: FocusLevel::High,
                        date: TaskDate::Day(origin + Duration::days(i64::from(*offset))),
                    })
                    .collect::<Vec<_>>();
                let now = crate::domain::week::local_start_of_day(
                    origin + Duration::days(i64::from(now_offset)),
                    &Tz::UTC,
                ) + Duration::hours(12);

                let generator = Arc::new(FakeSummaryGenerator::default());
                let ledger = SummaryLedger::new(Arc::new(InMemoryKeyValueStore::default()));
                let service = WeeklySummaryService::new(Arc::clone(&generator), ledger.clone(), Tz::UTC)
                    .with_now_provider(Arc::new(move || now));

                service.backfill(&tasks).await.expect("first backfill");
                let first_calls = generator.calls();
                let mut labels = first_calls
                    .iter()
                    .filter_map(|call| call.label.clone())
                    .collect::<Vec<_>>();
                let total = labels.len();
                labels.sort();
                labels.dedup();
                assert_eq!(labels.len(), total);

                for call in &first_calls {
                    assert!(!call.tasks.is_empty());
                }

                let second = service.backfill(&tasks).await.expect("second backfill");
                assert!(second.generated.is_empty());
                assert_eq!(generator.calls().len(), first_calls.len());
            });
        }
    }
}
