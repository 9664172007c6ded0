//! Deterministic classification of raw slot attributes.
//!
//! These are computed once when a slot is registered and stored alongside
//! it; nothing recomputes them implicitly afterwards.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// First hour that belongs to [`TimeBucket::Midday`].
const MIDDAY_START_HOUR: u32 = 10;
/// First hour that belongs to [`TimeBucket::Evening`].
const EVENING_START_HOUR: u32 = 15;

/// Daily partition a tee time falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Morning,
    Midday,
    Evening,
}

impl TimeBucket {
    /// All buckets in display order.
    pub const ALL: [TimeBucket; 3] = [TimeBucket::Morning, TimeBucket::Midday, TimeBucket::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Morning => "morning",
            TimeBucket::Midday => "midday",
            TimeBucket::Evening => "evening",
        }
    }

    /// Position within [`TimeBucket::ALL`].
    pub fn index(&self) -> usize {
        match self {
            TimeBucket::Morning => 0,
            TimeBucket::Midday => 1,
            TimeBucket::Evening => 2,
        }
    }
}

impl std::str::FromStr for TimeBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(TimeBucket::Morning),
            "midday" => Ok(TimeBucket::Midday),
            "evening" => Ok(TimeBucket::Evening),
            _ => Err(format!("Invalid time bucket: {}", s)),
        }
    }
}

/// Whether a slot is booked by a full group or shared between parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingCategory {
    /// Four players
    FullGroup,
    /// One to three players
    Shared,
}

impl BookingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingCategory::FullGroup => "full_group",
            BookingCategory::Shared => "shared",
        }
    }
}

impl std::str::FromStr for BookingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_group" => Ok(BookingCategory::FullGroup),
            "shared" => Ok(BookingCategory::Shared),
            _ => Err(format!("Invalid booking category: {}", s)),
        }
    }
}

/// Bucket for a wall-clock tee time. 10:00 is Midday, 15:00 is Evening.
pub fn time_bucket(time: NaiveTime) -> TimeBucket {
    match time.hour() {
        h if h < MIDDAY_START_HOUR => TimeBucket::Morning,
        h if h < EVENING_START_HOUR => TimeBucket::Midday,
        _ => TimeBucket::Evening,
    }
}

/// Category for a player count.
///
/// Callers validate the count (1..=4) before classifying.
pub fn booking_category(player_count: u8) -> BookingCategory {
    debug_assert!((1..=4).contains(&player_count));
    if player_count == 4 {
        BookingCategory::FullGroup
    } else {
        BookingCategory::Shared
    }
}

/// Calendar date of `now` in the configured time zone.
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// True iff `date` is not strictly before today's date in the configured zone.
pub fn is_future_or_today(date: NaiveDate, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    date >= local_today(now, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_time_bucket_boundaries() {
        assert_eq!(time_bucket(t(5, 30)), TimeBucket::Morning);
        assert_eq!(time_bucket(t(9, 59)), TimeBucket::Morning);
        assert_eq!(time_bucket(t(10, 0)), TimeBucket::Midday);
        assert_eq!(time_bucket(t(14, 59)), TimeBucket::Midday);
        assert_eq!(time_bucket(t(15, 0)), TimeBucket::Evening);
        assert_eq!(time_bucket(t(23, 59)), TimeBucket::Evening);
    }

    #[test]
    fn test_booking_category_boundary() {
        assert_eq!(booking_category(4), BookingCategory::FullGroup);
        for count in 1..=3 {
            assert_eq!(booking_category(count), BookingCategory::Shared);
        }
    }

    #[test]
    fn test_is_future_or_today_ignores_time_of_day() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 23, 59, 59).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();

        assert!(is_future_or_today(today, now, utc));
        assert!(is_future_or_today(today.succ_opt().unwrap(), now, utc));
        assert!(!is_future_or_today(today.pred_opt().unwrap(), now, utc));
    }

    #[test]
    fn test_is_future_or_today_uses_configured_zone() {
        // 20:00 UTC on the 10th is already the 11th at UTC+9
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 10, 20, 0, 0).unwrap();
        let the_10th = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();

        assert_eq!(local_today(now, seoul), the_10th.succ_opt().unwrap());
        assert!(!is_future_or_today(the_10th, now, seoul));
    }

    #[test]
    fn test_bucket_round_trips_through_str() {
        for bucket in TimeBucket::ALL {
            assert_eq!(bucket.as_str().parse::<TimeBucket>().unwrap(), bucket);
        }
        assert!("night".parse::<TimeBucket>().is_err());
    }
}
