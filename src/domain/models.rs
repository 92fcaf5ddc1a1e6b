use crate::domain::week::local_start_of_day;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FocusLevel {
    Low,
    Medium,
    High,
}

impl FocusLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for FocusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FocusLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unsupported focus level: {other}")),
        }
    }
}

/// Years a task date may carry; week arithmetic stays well inside chrono's range.
pub const TASK_YEAR_RANGE: std::ops::RangeInclusive<i32> = 1..=9999;

/// When a task happened: a plain calendar day or an exact instant.
///
/// Calendar days are read as local midnight of the configured zone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TaskDate {
    Day(NaiveDate),
    At(DateTime<Utc>),
}

impl TaskDate {
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let parsed = if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Self::Day(date)
        } else if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            Self::At(parsed.with_timezone(&Utc))
        } else {
            return Err(format!("date must be RFC3339 or YYYY-MM-DD: {value}"));
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), String> {
        let year = match self {
            Self::Day(date) => date.year(),
            Self::At(instant) => instant.year(),
        };
        if !TASK_YEAR_RANGE.contains(&year) {
            return Err(format!(
                "task.date year must be between {} and {}: {self}",
                TASK_YEAR_RANGE.start(),
                TASK_YEAR_RANGE.end()
            ));
        }
        Ok(())
    }

    pub fn instant(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            Self::Day(date) => local_start_of_day(*date, tz),
            Self::At(instant) => *instant,
        }
    }

    pub fn local_date(&self, tz: &Tz) -> NaiveDate {
        match self {
            Self::Day(date) => *date,
            Self::At(instant) => instant.with_timezone(tz).date_naive(),
        }
    }
}

impl fmt::Display for TaskDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::At(instant) => f.write_str(&instant.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub time_spent: u32,
    pub focus: FocusLevel,
    pub date: TaskDate,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "task.name")?;
        if self.time_spent == 0 {
            return Err("task.timeSpent must be a positive number of minutes".to_string());
        }
        self.date.validate()
    }
}

/// A weekly summary as surfaced to the user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WeeklySummary {
    pub label: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub summary: String,
    pub similarity: f64,
    pub label: String,
}

fn validate_non_empty(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}
