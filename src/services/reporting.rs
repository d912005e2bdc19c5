use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::models::attendance_event::DailyAttendance;

/// Window for the dashboard's "expiring soon" count
pub const EXPIRING_SOON_DAYS: i64 = 7;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportingError {
    #[error("Invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub total_attendance: i64,
    pub unique_members: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
    pub total_attendance: i64,
}

/// `[first day, first day of next month)` as UTC instants
pub fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportingError> {
    let invalid = ReportingError::InvalidMonth { year, month };

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(invalid.clone())?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or(invalid)?;

    Ok((start_of_day(first), start_of_day(next)))
}

/// `[00:00, next 00:00)` of the UTC day containing `now`
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(now.date_naive());
    (start, start + Duration::days(1))
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// Builds a calendar with one entry per day of the month. Days without
/// attendance are present with zero counts.
pub fn build_month_calendar(
    year: i32,
    month: u32,
    rows: &[DailyAttendance],
) -> Result<MonthCalendar, ReportingError> {
    let (from, to) = month_bounds(year, month)?;

    let by_day: HashMap<NaiveDate, &DailyAttendance> = rows.iter().map(|r| (r.day, r)).collect();

    let days: Vec<CalendarDay> = from
        .date_naive()
        .iter_days()
        .take_while(|d| *d < to.date_naive())
        .map(|date| match by_day.get(&date) {
            Some(row) => CalendarDay {
                date,
                total_attendance: row.check_ins,
                unique_members: row.unique_members,
            },
            None => CalendarDay {
                date,
                total_attendance: 0,
                unique_members: 0,
            },
        })
        .collect();

    let total_attendance = days.iter().map(|d| d.total_attendance).sum();

    Ok(MonthCalendar {
        year,
        month,
        days,
        total_attendance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, check_ins: i64, unique_members: i64) -> DailyAttendance {
        DailyAttendance {
            day: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            check_ins,
            unique_members,
        }
    }

    #[test]
    fn test_month_bounds() {
        let (from, to) = month_bounds(2024, 12).unwrap();
        assert_eq!(from.to_rfc3339(), "2024-12-01T00:00:00+00:00");
        assert_eq!(to.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(
            month_bounds(2024, 13).unwrap_err(),
            ReportingError::InvalidMonth { year: 2024, month: 13 }
        );
        assert!(build_month_calendar(2024, 0, &[]).is_err());
    }

    #[test]
    fn test_calendar_fills_every_day() {
        let calendar = build_month_calendar(2024, 2, &[row(3, 5, 4), row(29, 2, 2)]).unwrap();

        assert_eq!(calendar.days.len(), 29);
        assert_eq!(calendar.days[0].total_attendance, 0);
        assert_eq!(calendar.days[2].total_attendance, 5);
        assert_eq!(calendar.days[2].unique_members, 4);
        assert_eq!(calendar.days[28].total_attendance, 2);
        assert_eq!(calendar.total_attendance, 7);
    }

    #[test]
    fn test_day_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 13, 45, 0).unwrap();
        let (start, end) = day_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 5, 18, 0, 0, 0).unwrap());
    }
}
