//! Windows FILETIME conversion
//!
//! File records of the newer package versions store their write time as a
//! FILETIME: the number of 100 ns ticks since 1601-01-01 00:00:00 UTC.

use crate::rmdp::error::{Result, RmdpError};
use chrono::{DateTime, Utc};

/// FILETIME value of the Unix epoch (1970-01-01 00:00:00 UTC)
pub const EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

/// FILETIME ticks per second
pub const TICKS_PER_SECOND: u64 = 10_000_000;

const NANOS_PER_TICK: u32 = 100;

/// Convert a FILETIME value into a UTC timestamp
pub fn filetime_to_datetime(filetime: u64) -> Result<DateTime<Utc>> {
    let ticks = i128::from(filetime) - i128::from(EPOCH_AS_FILETIME);
    let ticks_per_second = i128::from(TICKS_PER_SECOND);

    let seconds = i64::try_from(ticks.div_euclid(ticks_per_second))
        .map_err(|_| RmdpError::InvalidTimestamp(filetime.to_string()))?;
    let nanos = u32::try_from(ticks.rem_euclid(ticks_per_second))
        .map_err(|_| RmdpError::InvalidTimestamp(filetime.to_string()))?
        * NANOS_PER_TICK;

    DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| RmdpError::InvalidTimestamp(filetime.to_string()))
}

/// Convert a UTC timestamp into a FILETIME value
///
/// Sub-tick precision is truncated.
pub fn datetime_to_filetime(time: DateTime<Utc>) -> Result<u64> {
    let ticks = i128::from(time.timestamp()) * i128::from(TICKS_PER_SECOND)
        + i128::from(time.timestamp_subsec_nanos() / NANOS_PER_TICK)
        + i128::from(EPOCH_AS_FILETIME);

    u64::try_from(ticks).map_err(|_| RmdpError::InvalidTimestamp(time.to_rfc3339()))
}

/// Convert a filesystem modification time into a UTC timestamp
pub fn system_time_to_datetime(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}
