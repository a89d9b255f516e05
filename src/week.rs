use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// The ISO week (Monday through Sunday, UTC) containing some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Returns the Monday 00:00:00.000Z start and Sunday 23:59:59.999Z end of
/// the ISO week containing `at`. A Sunday folds into the week that began on
/// the *previous* Monday, not the next one.
pub fn iso_week_range(at: DateTime<Utc>) -> WeekRange {
    let date = at.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let start = Utc.from_utc_datetime(&monday.and_hms_opt(0, 0, 0).unwrap());
    let end = Utc.from_utc_datetime(&(monday + Duration::days(6)).and_hms_milli_opt(23, 59, 59, 999).unwrap());
    WeekRange { start, end }
}

pub fn is_within_range(at: DateTime<Utc>, range: &WeekRange) -> bool {
    at >= range.start && at <= range.end
}

/// The next Monday 01:00 UTC strictly after `now` — the weekly cleanup slot,
/// placed after the week has rolled over.
pub fn next_cleanup_at(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let this_weeks_slot = Utc.from_utc_datetime(&monday.and_hms_opt(1, 0, 0).unwrap());
    if this_weeks_slot > now {
        this_weeks_slot
    } else {
        this_weeks_slot + Duration::weeks(1)
    }
}

/// Retention housekeeping: drops leave requests whose week has fully passed.
/// Deletion is idempotent; a second run in the same week finds nothing.
pub async fn weekly_leave_cleanup(pg: PgPool) {
    loop {
        let now = Utc::now();
        let wake_at = next_cleanup_at(now);
        let wait = (wake_at - now)
            .to_std()
            .unwrap_or_else(|_| std::time::Duration::from_secs(0));
        tokio::time::sleep(wait).await;

        let current_week = iso_week_range(Utc::now());
        match sqlx::query("DELETE FROM leave_requests WHERE week_end < $1")
            .bind(current_week.start)
            .execute(&pg)
            .await
        {
            Ok(result) => log::info!(
                "leave cleanup completed, removed {} stale requests",
                result.rows_affected()
            ),
            Err(err) => log::error!("leave cleanup failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn wednesday_maps_to_surrounding_monday_and_sunday() {
        // 2024-05-15 is a Wednesday
        let range = iso_week_range(utc(2024, 5, 15, 13, 45, 12));
        assert_eq!(range.start, utc(2024, 5, 13, 0, 0, 0));
        assert_eq!(range.start.weekday(), Weekday::Mon);
        assert_eq!(
            range.end,
            utc(2024, 5, 19, 23, 59, 59) + Duration::milliseconds(999)
        );
        assert_eq!(range.end.weekday(), Weekday::Sun);
    }

    #[test]
    fn sunday_folds_into_the_same_week() {
        // 2024-05-19 is a Sunday; its week began on the 13th
        let range = iso_week_range(utc(2024, 5, 19, 8, 0, 0));
        assert_eq!(range.start, utc(2024, 5, 13, 0, 0, 0));
    }

    #[test]
    fn monday_midnight_is_its_own_week_start() {
        let range = iso_week_range(utc(2024, 5, 13, 0, 0, 0));
        assert_eq!(range.start, utc(2024, 5, 13, 0, 0, 0));
    }

    #[test]
    fn range_membership_is_inclusive() {
        let range = iso_week_range(utc(2024, 5, 15, 0, 0, 0));
        assert!(is_within_range(range.start, &range));
        assert!(is_within_range(range.end, &range));
        assert!(!is_within_range(range.end + Duration::milliseconds(1), &range));
        assert!(!is_within_range(range.start - Duration::milliseconds(1), &range));
    }

    #[test]
    fn cleanup_runs_monday_early_morning() {
        // Wednesday -> the following Monday 01:00
        let next = next_cleanup_at(utc(2024, 5, 15, 12, 0, 0));
        assert_eq!(next, utc(2024, 5, 20, 1, 0, 0));

        // Monday 00:30 -> the same Monday 01:00
        let next = next_cleanup_at(utc(2024, 5, 13, 0, 30, 0));
        assert_eq!(next, utc(2024, 5, 13, 1, 0, 0));

        // Monday 01:00 exactly -> a week later
        let next = next_cleanup_at(utc(2024, 5, 13, 1, 0, 0));
        assert_eq!(next, utc(2024, 5, 20, 1, 0, 0));
    }
}
