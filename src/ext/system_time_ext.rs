use std::time::{Duration, SystemTime};

pub trait SystemTimeExt: Sized {
    /// Builds a time from whole seconds relative to the Unix epoch, `None` on overflow.
    fn from_unix_seconds(seconds: i64) -> Option<Self>;

    /// Whole seconds relative to the Unix epoch, negative before it.
    fn unix_seconds(&self) -> i64;
}

impl SystemTimeExt for SystemTime {
    fn from_unix_seconds(seconds: i64) -> Option<Self> {
        let offset = Duration::from_secs(seconds.unsigned_abs());
        if seconds >= 0 {
            SystemTime::UNIX_EPOCH.checked_add(offset)
        } else {
            SystemTime::UNIX_EPOCH.checked_sub(offset)
        }
    }

    fn unix_seconds(&self) -> i64 {
        match self.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_secs())
                .map(|secs| -secs)
                .unwrap_or(i64::MIN),
        }
    }
}
