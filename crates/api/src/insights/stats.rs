//! Habit statistics read from the habit store

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use time::Date;

use super::input::{iso_date, ReportInput};

/// One habit's state on a single day
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HabitItem {
    pub habit_id: String,
    pub title: String,
    pub done: bool,
}

/// Check-ins on one day of a range
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayItem {
    pub day: String,
    pub completed: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum StatItem {
    Habit(HabitItem),
    Day(DayItem),
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Totals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<i64>,
    pub habits_total: i64,
    pub completed: i64,
    pub rate_pct: f64,
}

impl Totals {
    fn new(days: Option<i64>, habits_total: i64, completed: i64) -> Self {
        Self {
            days,
            habits_total,
            completed,
            rate_pct: rate_pct(completed, habits_total),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ReportStats {
    pub totals: Totals,
    pub items: Vec<StatItem>,
}

/// Completion rate as a percentage rounded to one decimal
pub fn rate_pct(completed: i64, total: i64) -> f64 {
    let rate = completed as f64 / total.max(1) as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

#[derive(Debug, FromRow)]
struct HabitDayRow {
    id: String,
    title: String,
    completed: i64,
}

#[derive(Debug, FromRow)]
struct DayRollupRow {
    date: String,
    total: i64,
    completed: i64,
}

/// Load the statistics a report for `input` is built from
pub async fn load_stats(
    pool: &SqlitePool,
    user_id: &str,
    input: &ReportInput,
) -> Result<ReportStats, sqlx::Error> {
    match input {
        ReportInput::Habit { date, .. } => habits_on(pool, user_id, *date).await,
        _ => {
            let (start, end) = input.range();
            daily_rollup(pool, user_id, start, end).await
        }
    }
}

async fn habits_on(pool: &SqlitePool, user_id: &str, date: Date) -> Result<ReportStats, sqlx::Error> {
    let rows: Vec<HabitDayRow> = sqlx::query_as(
        r#"
        SELECT h.id, h.title, COALESCE(l.completed, 0) AS completed
        FROM habits h
        LEFT JOIN habit_logs l ON l.habit_id = h.id AND l.date = ?
        WHERE h.user_id = ?
        ORDER BY h.created_at, h.id
        "#,
    )
    .bind(iso_date(date))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let completed = rows.iter().filter(|r| r.completed != 0).count() as i64;
    let totals = Totals::new(None, rows.len() as i64, completed);
    let items = rows
        .into_iter()
        .map(|r| {
            StatItem::Habit(HabitItem {
                habit_id: r.id,
                title: r.title,
                done: r.completed != 0,
            })
        })
        .collect();

    Ok(ReportStats { totals, items })
}

async fn daily_rollup(
    pool: &SqlitePool,
    user_id: &str,
    start: Date,
    end: Date,
) -> Result<ReportStats, sqlx::Error> {
    let rows: Vec<DayRollupRow> = sqlx::query_as(
        r#"
        SELECT date, COUNT(*) AS total, COALESCE(SUM(CASE WHEN completed != 0 THEN 1 ELSE 0 END), 0) AS completed
        FROM habit_logs
        WHERE user_id = ? AND date >= ? AND date < ?
        GROUP BY date
        ORDER BY date
        "#,
    )
    .bind(user_id)
    .bind(iso_date(start))
    .bind(iso_date(end))
    .fetch_all(pool)
    .await?;

    let habits_total = rows.iter().map(|r| r.total).sum();
    let completed = rows.iter().map(|r| r.completed).sum();
    let totals = Totals::new(Some(rows.len() as i64), habits_total, completed);
    let items = rows
        .into_iter()
        .map(|r| {
            StatItem::Day(DayItem {
                day: r.date,
                completed: r.completed,
                total: r.total,
            })
        })
        .collect();

    Ok(ReportStats { totals, items })
}


#[cfg(test)]
mod tests {
    use super::fixtures::{habit, log};
    use super::*;
    use habitpay_shared::create_memory_pool;
    use time::macros::date;

    #[test]
    fn test_rate_pct_rounding() {
        assert_eq!(rate_pct(2, 3), 66.7);
        assert_eq!(rate_pct(0, 0), 0.0);
        assert_eq!(rate_pct(4, 5), 80.0);
    }

    #[tokio::test]
    async fn test_single_day_lists_every_habit() {
        let pool = create_memory_pool().await.unwrap();
        habit(&pool, "u1", "h1", "Meditation", 1).await;
        habit(&pool, "u1", "h2", "Workout", 2).await;
        habit(&pool, "u2", "h3", "Other user", 3).await;
        log(&pool, "u1", "h1", "2024-01-01", true).await;
        log(&pool, "u1", "h2", "2024-01-02", true).await;

        let input = ReportInput::Habit {
            date: date!(2024 - 01 - 01),
            high_accuracy: false,
        };
        let stats = load_stats(&pool, "u1", &input).await.unwrap();

        assert_eq!(stats.totals, Totals::new(None, 2, 1));
        assert_eq!(stats.items.len(), 2);
        assert!(matches!(&stats.items[0], StatItem::Habit(h) if h.title == "Meditation" && h.done));
        assert!(matches!(&stats.items[1], StatItem::Habit(h) if !h.done));
    }

    #[tokio::test]
    async fn test_weekly_rollup_respects_range() {
        let pool = create_memory_pool().await.unwrap();
        habit(&pool, "u1", "h1", "Reading", 1).await;
        habit(&pool, "u1", "h2", "Walk", 2).await;
        log(&pool, "u1", "h1", "2024-05-13", true).await;
        log(&pool, "u1", "h2", "2024-05-13", false).await;
        log(&pool, "u1", "h1", "2024-05-19", true).await;
        // Next Monday is outside the week
        log(&pool, "u1", "h1", "2024-05-20", true).await;

        let input = ReportInput::Weekly {
            week_start: date!(2024 - 05 - 13),
            high_accuracy: false,
        };
        let stats = load_stats(&pool, "u1", &input).await.unwrap();

        assert_eq!(stats.totals.days, Some(2));
        assert_eq!(stats.totals.habits_total, 3);
        assert_eq!(stats.totals.completed, 2);
        assert_eq!(stats.totals.rate_pct, 66.7);
        assert_eq!(
            stats.items[0],
            StatItem::Day(DayItem {
                day: "2024-05-13".into(),
                completed: 1,
                total: 2
            })
        );
    }

    #[tokio::test]
    async fn test_empty_month() {
        let pool = create_memory_pool().await.unwrap();
        let input = ReportInput::Monthly {
            first_day: date!(2024 - 02 - 01),
            high_accuracy: true,
        };
        let stats = load_stats(&pool, "nobody", &input).await.unwrap();
        assert!(stats.items.is_empty());
        assert_eq!(stats.totals.rate_pct, 0.0);
    }
}
