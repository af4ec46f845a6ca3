//! Timestamp handling.
//!
//! 7z stores times as Windows FILETIME values: 64-bit counts of
//! 100-nanosecond intervals since 1601-01-01 (UTC). [`Timestamp`] wraps the
//! raw value and converts to and from `SystemTime` without losing the
//! 100 ns precision.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601-01-01) and the Unix epoch
/// (1970-01-01), in 100-nanosecond intervals.
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

/// Number of 100-nanosecond intervals per second.
const INTERVALS_PER_SECOND: u64 = 10_000_000;

/// A timestamp from a 7z archive.
///
/// # Example
///
/// ```rust
/// use sieben::Timestamp;
/// use std::time::SystemTime;
///
/// let ts = Timestamp::from_filetime(116_444_736_000_000_000);
/// assert_eq!(ts.as_system_time(), SystemTime::UNIX_EPOCH);
/// assert_eq!(ts.as_unix_secs(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Creates a timestamp from a raw FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns Unix seconds (may be negative for times before 1970).
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / INTERVALS_PER_SECOND) as i64
        } else {
            -(((FILETIME_UNIX_DIFF - self.filetime).div_ceil(INTERVALS_PER_SECOND)) as i64)
        }
    }

    /// Converts to `SystemTime`, preserving the full 100 ns precision.
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let intervals = self.filetime - FILETIME_UNIX_DIFF;
            UNIX_EPOCH + Duration::from_nanos(intervals.saturating_mul(100))
        } else {
            let intervals = FILETIME_UNIX_DIFF - self.filetime;
            UNIX_EPOCH - Duration::from_nanos(intervals.saturating_mul(100))
        }
    }

    /// Creates a timestamp from a `SystemTime`.
    ///
    /// Returns `None` for times before 1601 or past the FILETIME range.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let intervals = after.as_nanos() / 100;
                let intervals = u64::try_from(intervals).ok()?;
                FILETIME_UNIX_DIFF
                    .checked_add(intervals)
                    .map(Self::from_filetime)
            }
            Err(e) => {
                let before = e.duration();
                let intervals = u64::try_from(before.as_nanos() / 100).ok()?;
                FILETIME_UNIX_DIFF
                    .checked_sub(intervals)
                    .map(Self::from_filetime)
            }
        }
    }
}
