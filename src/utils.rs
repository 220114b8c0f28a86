use std::time::Duration;

use crate::error::TimerError;

/// Convert a number of seconds into a [`Duration`].
///
/// Rejects negative, NaN and infinite values instead of saturating, so a bad
/// interval never turns into a zero-length delay.
pub fn seconds(secs: f64) -> Result<Duration, TimerError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| TimerError::InvalidDuration(format!("{secs} seconds: {err}")))
}

/// Nanoseconds of `duration`, or `None` when it does not fit in a `u64`.
pub(crate) fn duration_nanos(duration: Duration) -> Option<u64> {
    u64::try_from(duration.as_nanos()).ok()
}
