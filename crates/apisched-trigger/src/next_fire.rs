//! Pure next-fire computation for both cadence kinds.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;

/// For INTERVAL kind: previous fire + interval seconds. First fire is
/// `reference + interval`, matching §4.4 ("first fire = registration
/// instant + interval").
pub fn next_interval_fire(reference: DateTime<Utc>, interval_seconds: i64) -> DateTime<Utc> {
    reference + chrono::Duration::seconds(interval_seconds)
}

/// The reference's five-field cron grammar (minute, hour, day, month,
/// day-of-week) is adapted to the `cron` crate's six/seven-field grammar
/// by prepending a literal `"0"` seconds field. Evaluated in `tz`,
/// returning the earliest fire strictly greater than `after`, converted
/// back to UTC.
pub fn next_cron_fire(expr: &str, tz: &Tz, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = parse_five_field_cron(expr)?;
    let zoned_after = after.with_timezone(tz);
    schedule
        .after(&zoned_after)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .context("cron expression has no future fire time")
}

pub fn parse_five_field_cron(expr: &str) -> Result<CronSchedule> {
    let with_seconds = format!("0 {expr}");
    CronSchedule::from_str(&with_seconds).with_context(|| format!("invalid cron expression: {expr}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_fire_is_reference_plus_interval() {
        let reference = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_interval_fire(reference, 60);
        assert_eq!(next, reference + chrono::Duration::seconds(60));
    }

    #[test]
    fn five_field_cron_parses_via_seconds_prefix() {
        assert!(parse_five_field_cron("*/5 * * * *").is_ok());
        assert!(parse_five_field_cron("0 9 * * MON-FRI").is_ok());
    }

    #[test]
    fn rejects_malformed_cron() {
        assert!(parse_five_field_cron("not a cron").is_err());
    }

    #[test]
    fn cron_fire_advances_strictly_past_reference() {
        let tz: Tz = "UTC".parse().unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_cron_fire("* * * * *", &tz, after).unwrap();
        assert!(next > after);
    }
}
