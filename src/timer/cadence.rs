use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

use crate::utils::duration_nanos;

/// Lower bound on a compensated delay unless configured otherwise.
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(1);

/// How a periodic timer picks the delay of its next registration.
pub(crate) enum Cadence {
    /// Always wait one full interval from the moment of registration.
    Fixed,
    /// Land on the next `start + k * interval` slot.
    Compensated(Arc<Compensation>),
}

impl Cadence {
    pub(crate) fn next_delay(&self, now: Instant, interval: Duration) -> Duration {
        match self {
            Cadence::Fixed => interval,
            Cadence::Compensated(compensation) => compensation.next_delay(now, interval),
        }
    }
}

/// Phase anchor of a compensating timer.
pub(crate) struct Compensation {
    start: Instant,
    resolution_nanos: AtomicU64,
}

impl Compensation {
    pub(crate) fn new(start: Instant, resolution: Duration) -> Self {
        Self {
            start,
            resolution_nanos: AtomicU64::new(saturating_nanos(resolution)),
        }
    }

    pub(crate) fn start(&self) -> Instant {
        self.start
    }

    pub(crate) fn resolution(&self) -> Duration {
        Duration::from_nanos(self.resolution_nanos.load(Ordering::Relaxed))
    }

    pub(crate) fn set_resolution(&self, resolution: Duration) {
        self.resolution_nanos
            .store(saturating_nanos(resolution), Ordering::Relaxed);
    }

    pub(crate) fn next_delay(&self, now: Instant, interval: Duration) -> Duration {
        compensated_delay(
            now.saturating_duration_since(self.start),
            interval,
            self.resolution(),
        )
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    duration_nanos(duration).unwrap_or(u64::MAX)
}

/// Delay from now until the next ideal slot, `elapsed` after the start.
///
/// Slots already missed are skipped rather than caught up on. A slot closer
/// than `resolution` is skipped too, so the result is never below
/// `resolution`. `interval` must not be zero.
pub(crate) fn compensated_delay(
    elapsed: Duration,
    interval: Duration,
    resolution: Duration,
) -> Duration {
    let interval_nanos = interval.as_nanos();
    let compensation = elapsed.as_nanos() % interval_nanos;
    let mut next_nanos = interval_nanos - compensation;

    let resolution_nanos = resolution.as_nanos();
    if next_nanos < resolution_nanos {
        // Whole intervals keep the target on a slot boundary.
        let missing = resolution_nanos - next_nanos;
        next_nanos += missing.div_ceil(interval_nanos) * interval_nanos;
    }
    nanos_to_duration(next_nanos)
}

fn nanos_to_duration(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}
