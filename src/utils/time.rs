use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// Midnight (UTC) of the calendar day `now` falls in.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
}
