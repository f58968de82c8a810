//! Bucket - 分単位の配送キー
//!
//! A bucket is a UTC timestamp floored to the start of its minute and rendered
//! as `YYYYMMDDHHmm`. It is the secondary index key the dispatcher queries by.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, TimeZone, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of the `YYYYMMDDHHmm` rendering.
const BUCKET_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketParseError {
    #[error("bucket must be 12 ASCII digits (YYYYMMDDHHmm), got {0:?}")]
    Format(String),

    #[error("bucket {0:?} is not a valid UTC minute")]
    OutOfRange(String),
}

/// A one-minute UTC time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket {
    start: DateTime<Utc>,
}

/// Floors `ts` to the start of its minute.
///
/// Always rounds down, including for instants before the Unix epoch.
pub fn floor_to_minute_utc(ts: DateTime<Utc>) -> Bucket {
    let start = ts
        - TimeDelta::seconds(i64::from(ts.second()))
        - TimeDelta::nanoseconds(i64::from(ts.nanosecond()));
    Bucket { start }
}

impl Bucket {
    /// Bucket containing the given instant.
    pub fn containing(ts: DateTime<Utc>) -> Self {
        floor_to_minute_utc(ts)
    }

    /// Bucket containing the given epoch-millisecond timestamp.
    ///
    /// Returns `None` when the timestamp is outside chrono's range.
    pub fn from_millis(ms: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(ms).map(floor_to_minute_utc)
    }

    /// First instant of the bucket.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// The bucket one minute later.
    pub fn next(&self) -> Self {
        Self {
            start: self.start + TimeDelta::minutes(1),
        }
    }

    pub fn parse(s: &str) -> Result<Self, BucketParseError> {
        if s.len() != BUCKET_LEN || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BucketParseError::Format(s.to_string()));
        }
        let field = |range: std::ops::Range<usize>| -> u32 {
            // all digits, at most 4 of them
            s[range].parse().unwrap_or_default()
        };
        let year = field(0..4) as i32;
        let out_of_range = || BucketParseError::OutOfRange(s.to_string());

        let date = NaiveDate::from_ymd_opt(year, field(4..6), field(6..8)).ok_or_else(out_of_range)?;
        let naive = date
            .and_hms_opt(field(8..10), field(10..12), 0)
            .ok_or_else(out_of_range)?;
        Ok(Self {
            start: Utc.from_utc_datetime(&naive),
        })
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.start;
        write!(
            f,
            "{:04}{:02}{:02}{:02}{:02}",
            s.year(),
            s.month(),
            s.day(),
            s.hour(),
            s.minute()
        )
    }
}

impl FromStr for Bucket {
    type Err = BucketParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bucket {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
