use crate::domain::models::{FocusLevel, Task};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct FocusMinutes {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl FocusMinutes {
    fn add(&mut self, focus: FocusLevel, minutes: u32) {
        let slot = match focus {
            FocusLevel::Low => &mut self.low,
            FocusLevel::Medium => &mut self.medium,
            FocusLevel::High => &mut self.high,
        };
        *slot = slot.saturating_add(u64::from(minutes));
    }

    pub fn total(&self) -> u64 {
        self.low + self.medium + self.high
    }
}

/// Stacked-bar row: minutes spent on one task name, split by focus.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskTimeBreakdown {
    pub name: String,
    pub minutes: FocusMinutes,
}

/// Trend point: minutes logged on one local day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyFocusTrend {
    pub date: NaiveDate,
    pub minutes: FocusMinutes,
    pub total: u64,
}

/// Groups by exact task name, keeping the order in which names first appear.
pub fn time_by_task(tasks: &[Task]) -> Vec<TaskTimeBreakdown> {
    let mut rows: Vec<TaskTimeBreakdown> = Vec::new();
    for task in tasks {
        match rows.iter_mut().find(|row| row.name == task.name) {
            Some(row) => row.minutes.add(task.focus, task.time_spent),
            None => {
                let mut minutes = FocusMinutes::default();
                minutes.add(task.focus, task.time_spent);
                rows.push(TaskTimeBreakdown {
                    name: task.name.clone(),
                    minutes,
                });
            }
        }
    }
    rows
}

pub fn daily_trend(tasks: &[Task], tz: &Tz) -> Vec<DailyFocusTrend> {
    let mut days: BTreeMap<NaiveDate, FocusMinutes> = BTreeMap::new();
    for task in tasks {
        days.entry(task.date.local_date(tz))
            .or_default()
            .add(task.focus, task.time_spent);
    }
    days.into_iter()
        .map(|(date, minutes)| DailyFocusTrend {
            date,
            total: minutes.total(),
            minutes,
        })
        .collect()
}
