//! Report request inputs
//!
//! Request bodies are parsed leniently: a missing or unparseable value falls
//! back to the current day, week or month instead of failing the request.

use serde_json::{json, Value};
use time::{
    macros::{format_description, time},
    Date, Duration, Month, OffsetDateTime, Time,
};

/// Cache validity for per-report caches
pub const REPORT_CACHE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Habit,
    Weekly,
    Monthly,
}

impl ReportKind {
    /// Catalogue endpoint name, also the cache and rate-limit scope
    pub fn endpoint(&self) -> &'static str {
        match self {
            ReportKind::Habit => "insight/habit",
            ReportKind::Weekly => "insight/weekly",
            ReportKind::Monthly => "insight/monthly",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ReportKind::Habit => "/api/paid/insight/habit",
            ReportKind::Weekly => "/api/paid/insight/weekly",
            ReportKind::Monthly => "/api/paid/insight/monthly",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::Habit => "Habit",
            ReportKind::Weekly => "Weekly",
            ReportKind::Monthly => "Monthly",
        }
    }
}

/// A normalized report request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportInput {
    Habit { date: Date, high_accuracy: bool },
    /// `week_start` is always a Monday
    Weekly { week_start: Date, high_accuracy: bool },
    /// `first_day` is always the first of the month
    Monthly { first_day: Date, high_accuracy: bool },
}

impl ReportInput {
    /// Parse a raw request body for `kind`, relative to `today`
    pub fn parse(kind: ReportKind, body: &[u8], today: Date) -> Self {
        let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let high_accuracy = truthy(body.get("highAccuracy"));
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::trim);

        match kind {
            ReportKind::Habit => ReportInput::Habit {
                date: field("date").and_then(parse_date).unwrap_or(today),
                high_accuracy,
            },
            ReportKind::Weekly => ReportInput::Weekly {
                week_start: monday_of(field("week_start").and_then(parse_date).unwrap_or(today)),
                high_accuracy,
            },
            ReportKind::Monthly => ReportInput::Monthly {
                first_day: field("month")
                    .and_then(parse_month)
                    .unwrap_or_else(|| first_of_month(today)),
                high_accuracy,
            },
        }
    }

    pub fn kind(&self) -> ReportKind {
        match self {
            ReportInput::Habit { .. } => ReportKind::Habit,
            ReportInput::Weekly { .. } => ReportKind::Weekly,
            ReportInput::Monthly { .. } => ReportKind::Monthly,
        }
    }

    pub fn high_accuracy(&self) -> bool {
        match self {
            ReportInput::Habit { high_accuracy, .. }
            | ReportInput::Weekly { high_accuracy, .. }
            | ReportInput::Monthly { high_accuracy, .. } => *high_accuracy,
        }
    }

    /// The object hashed into the cache key and stored in the audit row
    pub fn cache_key(&self) -> Value {
        let (field, value) = self.key_field();
        json!({ field: value, "highAccuracy": self.high_accuracy() })
    }

    /// Name and value of the report's anchor field, e.g. `("date", "2024-01-01")`
    pub fn key_field(&self) -> (&'static str, String) {
        match self {
            ReportInput::Habit { date, .. } => ("date", iso_date(*date)),
            ReportInput::Weekly { week_start, .. } => ("week_start", iso_date(*week_start)),
            ReportInput::Monthly { first_day, .. } => ("month", iso_month(*first_day)),
        }
    }

    /// Human label used in summaries
    pub fn label(&self) -> String {
        match self {
            ReportInput::Habit { date, .. } => iso_date(*date),
            ReportInput::Weekly { week_start, .. } => format!("week of {}", iso_date(*week_start)),
            ReportInput::Monthly { first_day, .. } => iso_month(*first_day),
        }
    }

    /// Covered days as `[start, end)`
    pub fn range(&self) -> (Date, Date) {
        match self {
            ReportInput::Habit { date, .. } => (*date, *date + Duration::days(1)),
            ReportInput::Weekly { week_start, .. } => (*week_start, *week_start + Duration::days(7)),
            ReportInput::Monthly { first_day, .. } => (*first_day, next_month(*first_day)),
        }
    }

    /// When a report generated at `now` stops being served from cache.
    ///
    /// Weekly reports stay valid until 23:59:59 UTC of the day after the
    /// week ends; everything else, and any weekly deadline already passed,
    /// gets the fixed window.
    pub fn valid_until(&self, now: OffsetDateTime) -> OffsetDateTime {
        let fixed = now + Duration::days(REPORT_CACHE_DAYS);
        match self {
            ReportInput::Weekly { week_start, .. } => {
                let grace_day = *week_start + Duration::days(7);
                let deadline = grace_day.with_time(END_OF_DAY).assume_utc();
                if deadline > now {
                    deadline
                } else {
                    fixed
                }
            }
            _ => fixed,
        }
    }
}

const END_OF_DAY: Time = time!(23:59:59);

/// Loose JavaScript-style truthiness for flags
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

fn parse_date(value: &str) -> Option<Date> {
    // Accept full timestamps by looking at the date prefix only
    let prefix = value.get(..10).unwrap_or(value);
    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

fn parse_month(value: &str) -> Option<Date> {
    let (year, month) = value.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month = Month::try_from(month.get(..2).unwrap_or(month).parse::<u8>().ok()?).ok()?;
    Date::from_calendar_date(year, month, 1).ok()
}

pub fn monday_of(date: Date) -> Date {
    date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
}

fn first_of_month(date: Date) -> Date {
    date - Duration::days(i64::from(date.day()) - 1)
}

fn next_month(first_day: Date) -> Date {
    // Day 1 plus 31 days always lands in the first days of the next month
    first_of_month(first_day + Duration::days(31))
}

pub fn iso_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

fn iso_month(date: Date) -> String {
    format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    const TODAY: Date = date!(2024 - 05 - 15); // a Wednesday

    #[test]
    fn test_habit_input_defaults_to_today() {
        let input = ReportInput::parse(ReportKind::Habit, b"not json", TODAY);
        assert_eq!(
            input,
            ReportInput::Habit {
                date: TODAY,
                high_accuracy: false
            }
        );

        let input = ReportInput::parse(ReportKind::Habit, br#"{"date":"31/12/2024"}"#, TODAY);
        assert_eq!(input.key_field().1, "2024-05-15");
    }

    #[test]
    fn test_habit_input_parses_date_and_flag() {
        let input = ReportInput::parse(
            ReportKind::Habit,
            br#"{"highAccuracy": true, "date": "2024-01-01"}"#,
            TODAY,
        );
        assert_eq!(
            input.cache_key(),
            json!({"date": "2024-01-01", "highAccuracy": true})
        );
    }

    #[test]
    fn test_weekly_input_normalizes_to_monday() {
        let input = ReportInput::parse(ReportKind::Weekly, br#"{"week_start":"2024-05-18"}"#, TODAY);
        assert_eq!(input.key_field(), ("week_start", "2024-05-13".to_string()));
        assert_eq!(input.range(), (date!(2024 - 05 - 13), date!(2024 - 05 - 20)));
    }

    #[test]
    fn test_monthly_input_and_range() {
        let input = ReportInput::parse(ReportKind::Monthly, br#"{"month":"2024-02"}"#, TODAY);
        assert_eq!(input.label(), "2024-02");
        assert_eq!(input.range(), (date!(2024 - 02 - 01), date!(2024 - 03 - 01)));

        let input = ReportInput::parse(ReportKind::Monthly, br#"{"month":"2024-13"}"#, TODAY);
        assert_eq!(input.label(), "2024-05");

        let input = ReportInput::parse(ReportKind::Monthly, br#"{"month":"2023-12"}"#, TODAY);
        assert_eq!(input.range().1, date!(2024 - 01 - 01));
    }

    #[test]
    fn test_flag_truthiness() {
        assert!(truthy(Some(&json!(1))));
        assert!(truthy(Some(&json!("yes"))));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(None));
    }

    #[test]
    fn test_weekly_validity_runs_to_grace_day() {
        let input = ReportInput::Weekly {
            week_start: date!(2024 - 05 - 13),
            high_accuracy: false,
        };
        let now = datetime!(2024-05-15 10:00 UTC);
        assert_eq!(input.valid_until(now), datetime!(2024-05-20 23:59:59 UTC));
    }

    #[test]
    fn test_past_week_falls_back_to_fixed_window() {
        let input = ReportInput::Weekly {
            week_start: date!(2024 - 01 - 01),
            high_accuracy: false,
        };
        let now = datetime!(2024-05-15 10:00 UTC);
        assert_eq!(input.valid_until(now), now + Duration::days(7));
    }

    #[test]
    fn test_habit_validity_is_seven_days() {
        let input = ReportInput::Habit {
            date: TODAY,
            high_accuracy: true,
        };
        let now = datetime!(2024-05-15 10:00 UTC);
        assert_eq!(input.valid_until(now), datetime!(2024-05-22 10:00 UTC));
    }
}
