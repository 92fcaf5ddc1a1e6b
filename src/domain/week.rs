use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub const WEEK_LABEL_SEPARATOR: &str = " – ";
const LABEL_DATE_FORMAT: &str = "%a %-d %b %Y";
// `%d` parsing accepts one or two digits, so padded labels read back too.
const LABEL_PARSE_FORMAT: &str = "%a %d %b %Y";
const GAP_STEP_MINUTES: i64 = 15;
const GAP_STEP_LIMIT: i64 = 48;

/// Monday 00:00 through Sunday 23:59:59.999 in the configured local zone.
///
/// Instants are kept in UTC; the local calendar dates travel alongside so the
/// label never needs the zone again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WeekRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl WeekRange {
    pub fn containing(instant: DateTime<Utc>, tz: &Tz) -> Self {
        let local_date = instant.with_timezone(tz).date_naive();
        let monday = shift_days(
            local_date,
            -i64::from(local_date.weekday().num_days_from_monday()),
        );
        Self::starting_on(monday, tz)
    }

    fn starting_on(monday: NaiveDate, tz: &Tz) -> Self {
        let sunday = shift_days(monday, 6);
        Self {
            start: local_start_of_day(monday, tz),
            end: local_end_of_day(sunday, tz),
            start_date: monday,
            end_date: sunday,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{}{WEEK_LABEL_SEPARATOR}{}",
            self.start_date.format(LABEL_DATE_FORMAT),
            self.end_date.format(LABEL_DATE_FORMAT)
        )
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    pub fn following(&self, tz: &Tz) -> Self {
        Self::starting_on(shift_days(self.start_date, 7), tz)
    }
}

pub fn week_range(instant: DateTime<Utc>, tz: &Tz) -> WeekRange {
    WeekRange::containing(instant, tz)
}

/// True when nothing has been completed yet or the marker predates the
/// current week.
pub fn is_new_week(marker: Option<DateTime<Utc>>, now: DateTime<Utc>, tz: &Tz) -> bool {
    match marker {
        None => true,
        Some(marker) => marker < week_range(now, tz).start,
    }
}

pub fn parse_week_label(label: &str) -> Option<NaiveDate> {
    let (start, _) = label.split_once(WEEK_LABEL_SEPARATOR)?;
    NaiveDate::parse_from_str(start.trim(), LABEL_PARSE_FORMAT).ok()
}

pub fn local_start_of_day(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(value) => value.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Midnight skipped by a DST transition: take the first local instant after the gap.
        LocalResult::None => (1..=GAP_STEP_LIMIT)
            .find_map(|step| {
                naive
                    .checked_add_signed(Duration::minutes(step * GAP_STEP_MINUTES))
                    .and_then(|candidate| tz.from_local_datetime(&candidate).earliest())
            })
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

pub fn local_end_of_day(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let next_start = local_start_of_day(shift_days(date, 1), tz);
    next_start
        .checked_sub_signed(Duration::milliseconds(1))
        .unwrap_or(next_start)
}

/// Calendar shift that clamps at the ends of the representable range.
fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}
