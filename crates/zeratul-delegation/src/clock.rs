//! Epoch clock: unix timestamps to epoch indices
//!
//! Every balance and every lazy state transition is keyed by an epoch, a
//! monotonically increasing index derived from the current time. Two
//! schedules are supported:
//!
//! ```text
//! Fixed { origin, duration }
//!   epoch(ts) = (ts - origin) / duration
//!
//! CalendarMonths { origin_year: 2020, origin_month: 1 }
//!   2020-01-xx -> 0
//!   2020-02-xx -> 1
//!   2021-01-xx -> 12
//! ```
//!
//! The clock is pure. The current time comes from a [`TimeSource`], which is
//! either the wall clock or a [`ManualClock`] that tests and scenario replays
//! move forward explicitly.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ClockError;
use crate::types::Epoch;

/// How timestamps are grouped into epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpochSchedule {
    /// Equal-length epochs of `duration` seconds starting at `origin`
    Fixed { origin: u64, duration: u64 },
    /// One epoch per UTC calendar month, epoch 0 being the origin month
    CalendarMonths { origin_year: i32, origin_month: u32 },
}

impl Default for EpochSchedule {
    fn default() -> Self {
        EpochSchedule::CalendarMonths {
            origin_year: 2020,
            origin_month: 1,
        }
    }
}

/// Converts timestamps into epochs and back
#[derive(Debug, Clone, Copy)]
pub struct EpochClock {
    schedule: EpochSchedule,
    /// Timestamp at which epoch 0 starts
    origin: u64,
}

impl EpochClock {
    pub fn new(schedule: EpochSchedule) -> Result<Self, ClockError> {
        let origin = match schedule {
            EpochSchedule::Fixed { origin, duration } => {
                if duration == 0 {
                    return Err(ClockError::ZeroDuration);
                }
                origin
            }
            EpochSchedule::CalendarMonths {
                origin_year,
                origin_month,
            } => {
                let invalid = ClockError::InvalidOrigin {
                    year: origin_year,
                    month: origin_month,
                };
                if origin_year < 1970 {
                    return Err(invalid);
                }
                month_start(origin_year, origin_month).ok_or(invalid)?
            }
        };
        Ok(Self { schedule, origin })
    }

    pub fn schedule(&self) -> EpochSchedule {
        self.schedule
    }

    /// Timestamp at which epoch 0 starts
    pub fn origin(&self) -> u64 {
        self.origin
    }

    /// Epoch containing `timestamp`
    pub fn epoch_of(&self, timestamp: u64) -> Result<Epoch, ClockError> {
        if timestamp < self.origin {
            return Err(ClockError::BeforeOrigin {
                timestamp,
                origin: self.origin,
            });
        }

        match self.schedule {
            EpochSchedule::Fixed { origin, duration } => Ok((timestamp - origin) / duration),
            EpochSchedule::CalendarMonths {
                origin_year,
                origin_month,
            } => {
                let secs = i64::try_from(timestamp)
                    .map_err(|_| ClockError::InvalidTimestamp(timestamp))?;
                let date = Utc
                    .timestamp_opt(secs, 0)
                    .single()
                    .ok_or(ClockError::InvalidTimestamp(timestamp))?;

                let months = i64::from(date.year() - origin_year) * 12
                    + i64::from(date.month())
                    - i64::from(origin_month);
                // timestamp >= origin, so the month difference is non-negative
                Ok(months.max(0) as Epoch)
            }
        }
    }

    /// First second of `epoch`
    pub fn epoch_start(&self, epoch: Epoch) -> Result<u64, ClockError> {
        match self.schedule {
            EpochSchedule::Fixed { origin, duration } => epoch
                .checked_mul(duration)
                .and_then(|offset| offset.checked_add(origin))
                .ok_or(ClockError::OutOfRange(epoch)),
            EpochSchedule::CalendarMonths {
                origin_year,
                origin_month,
            } => {
                let total = u64::from(origin_month - 1)
                    .checked_add(epoch)
                    .ok_or(ClockError::OutOfRange(epoch))?;
                let year = i32::try_from(total / 12)
                    .ok()
                    .and_then(|years| origin_year.checked_add(years))
                    .ok_or(ClockError::OutOfRange(epoch))?;
                let month = (total % 12) as u32 + 1;
                month_start(year, month).ok_or(ClockError::OutOfRange(epoch))
            }
        }
    }
}

/// Unix timestamp of the first second of a UTC calendar month
fn month_start(year: i32, month: u32) -> Option<u64> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    u64::try_from(Utc.from_utc_datetime(&naive).timestamp()).ok()
}

/// Source of the current unix time
pub trait TimeSource: Send + Sync + fmt::Debug {
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Manually driven clock
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the controller owns another. Time never moves backwards.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move forward by `secs`
    pub fn skip(&self, secs: u64) {
        // closure always returns Some, so the update cannot fail
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(secs))
            });
    }

    /// Move to `timestamp` if it is later than the current time
    pub fn set(&self, timestamp: u64) {
        self.now.fetch_max(timestamp, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
