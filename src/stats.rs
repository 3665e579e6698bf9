use crate::models::{Counter, DailyPoint, DailyStats, RecentSession, Session, StatsSummary};
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

const RECENT_SESSIONS: usize = 5;

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn today_key() -> String {
    date_key(Utc::now().date_naive())
}

/// Calendar-day part of a stored date or timestamp.
pub fn day_key(date: &str) -> &str {
    date.split_once('T').map_or(date, |(day, _)| day)
}

/// The day after `day`, used as the exclusive upper bound of a day window.
pub fn next_day(day: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some(date_key(date + Duration::days(1)))
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayChange {
    Inserted,
    Updated { total: u64 },
    Removed,
    Unchanged,
}

/// Adds a signed delta to a total, saturating at both ends.
pub fn add_signed(total: u64, delta: i64) -> u64 {
    if delta >= 0 {
        total.saturating_add(delta.unsigned_abs())
    } else {
        total.saturating_sub(delta.unsigned_abs())
    }
}

/// Folds a signed count delta into the aggregate for `day`. A row that drops
/// to zero is removed; new rows go to the front.
pub fn apply_delta(stats: &mut Vec<DailyStats>, day: &str, delta: i64) -> DayChange {
    match stats.iter().position(|stat| stat.date.starts_with(day)) {
        Some(index) => {
            let total = add_signed(stats[index].total_count, delta);
            if total == 0 {
                stats.remove(index);
                DayChange::Removed
            } else {
                stats[index].total_count = total;
                DayChange::Updated { total }
            }
        }
        None if delta > 0 => {
            stats.insert(
                0,
                DailyStats {
                    id: Uuid::new_v4().to_string(),
                    user_id: None,
                    total_count: delta.unsigned_abs(),
                    date: day.to_string(),
                    created_at: timestamp_now(),
                },
            );
            DayChange::Inserted
        }
        None => DayChange::Unchanged,
    }
}

pub fn build_summary(sessions: &[Session], counters: &[Counter]) -> StatsSummary {
    build_summary_at(Utc::now().date_naive(), sessions, counters)
}

pub fn build_summary_at(today: NaiveDate, sessions: &[Session], counters: &[Counter]) -> StatsSummary {
    let count_for = |day: &str| -> u64 {
        sessions
            .iter()
            .filter(|session| day_key(&session.date) == day)
            .map(|session| session.count)
            .sum()
    };

    let mut last_7_days = Vec::with_capacity(7);
    for offset in (0..7).rev() {
        let date = date_key(today - Duration::days(offset));
        let count = count_for(&date);
        last_7_days.push(DailyPoint { date, count });
    }

    let active_days: BTreeSet<&str> = sessions.iter().map(|s| day_key(&s.date)).collect();

    let recent_sessions = sessions
        .iter()
        .take(RECENT_SESSIONS)
        .map(|session| RecentSession {
            id: session.id.clone(),
            counter_name: counters
                .iter()
                .find(|counter| counter.id == session.counter_id)
                .map_or_else(|| "Unknown".to_string(), |counter| counter.name.clone()),
            count: session.count,
            goal: session.goal,
            completed: session.completed,
            date: session.date.clone(),
        })
        .collect();

    StatsSummary {
        last_7_days,
        today_count: count_for(&date_key(today)),
        total_count: sessions.iter().map(|s| s.count).sum(),
        session_count: sessions.len(),
        active_days: active_days.len(),
        recent_sessions,
    }
}
