use crate::domain::week::parse_week_label;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SUMMARIES_KEY: &str = "weeklySummaries";
pub const LAST_SUMMARY_KEY: &str = "last_summary_timestamp";

/// Week label to summary text, plus the last-completed-week marker.
#[derive(Clone)]
pub struct SummaryLedger {
    store: Arc<dyn KeyValueStore>,
}

impl SummaryLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load_all(&self) -> Result<BTreeMap<String, String>, InfraError> {
        let Some(raw) = self.store.get(SUMMARIES_KEY)? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
            Ok(entries) => Ok(entries),
            Err(error) => {
                tracing::warn!(key = SUMMARIES_KEY, error = %error, "discarding malformed summary ledger");
                Ok(BTreeMap::new())
            }
        }
    }

    pub fn get(&self, label: &str) -> Result<Option<String>, InfraError> {
        Ok(self.load_all()?.remove(label))
    }

    /// Empty text counts as missing, matching how history is displayed.
    pub fn contains(&self, label: &str) -> Result<bool, InfraError> {
        Ok(self
            .get(label)?
            .map(|summary| !summary.is_empty())
            .unwrap_or(false))
    }

    pub fn put(&self, label: &str, summary: &str) -> Result<(), InfraError> {
        let mut entries = self.load_all()?;
        entries.insert(label.to_string(), summary.to_string());
        self.store.set(SUMMARIES_KEY, &serde_json::to_string(&entries)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        self.store.remove(SUMMARIES_KEY)
    }

    /// Non-empty entries ordered by the week each label starts on.
    pub fn history(&self) -> Result<Vec<(String, String)>, InfraError> {
        let mut entries = self
            .load_all()?
            .into_iter()
            .filter(|(_, summary)| !summary.is_empty())
            .collect::<Vec<_>>();
        entries.sort_by(|(left, _), (right, _)| {
            match (parse_week_label(left), parse_week_label(right)) {
                (Some(left_start), Some(right_start)) => left_start.cmp(&right_start),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => left.cmp(right),
            }
        });
        Ok(entries)
    }

    pub fn load_marker(&self) -> Result<Option<DateTime<Utc>>, InfraError> {
        let Some(raw) = self.store.get(LAST_SUMMARY_KEY)? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(error) => {
                tracing::warn!(key = LAST_SUMMARY_KEY, value = %raw, error = %error, "ignoring malformed marker");
                Ok(None)
            }
        }
    }

    pub fn save_marker(&self, marker: DateTime<Utc>) -> Result<(), InfraError> {
        self.store.set(
            LAST_SUMMARY_KEY,
            &marker.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )
    }
}
