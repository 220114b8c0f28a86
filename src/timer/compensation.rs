use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    error::TimerError,
    reactor::{Reactor, TimerHandle},
    timer::{
        cadence::{Cadence, Compensation, DEFAULT_RESOLUTION},
        callback::TimerCallback,
        periodic::PeriodicTimer,
    },
};

/// A periodic timer locked to the grid `start + k * interval`.
///
/// Every re-registration measures how far the clock has moved past the last
/// ideal slot and waits only for the remainder, so callback run time and
/// scheduler lag do not accumulate. When a callback overruns one or more
/// slots they are skipped; the timer never fires extra times to catch up.
/// A slot closer than [`resolution`](Self::resolution) is skipped as well.
pub struct CompensationPeriodicTimer {
    timer: PeriodicTimer,
    compensation: Arc<Compensation>,
}

impl CompensationPeriodicTimer {
    /// Create the timer with the default resolution of 1 ms. The start
    /// instant is the reactor's clock right now.
    pub fn new<R, C>(reactor: &R, interval: Duration, callback: C) -> Result<Self, TimerError>
    where
        R: Reactor + Clone,
        C: TimerCallback,
    {
        Self::with_resolution(reactor, interval, DEFAULT_RESOLUTION, callback)
    }

    pub fn with_resolution<R, C>(
        reactor: &R,
        interval: Duration,
        resolution: Duration,
        callback: C,
    ) -> Result<Self, TimerError>
    where
        R: Reactor + Clone,
        C: TimerCallback,
    {
        let reactor: Arc<dyn Reactor> = Arc::new(reactor.clone());
        let compensation = Arc::new(Compensation::new(reactor.now(), resolution));
        let cadence = Cadence::Compensated(compensation.clone());
        let timer = PeriodicTimer::with_cadence(reactor, interval, cadence, callback)?;
        Ok(Self {
            timer,
            compensation,
        })
    }

    /// The instant every ideal slot is measured from.
    pub fn start(&self) -> Instant {
        self.compensation.start()
    }

    pub fn resolution(&self) -> Duration {
        self.compensation.resolution()
    }

    /// Used from the next registration on.
    pub fn set_resolution(&self, resolution: Duration) {
        self.compensation.set_resolution(resolution);
    }

    /// Stop the timer lazily; see [`PeriodicTimer::cancel`].
    pub fn cancel(&self) {
        self.timer.cancel();
    }

    /// Stop the timer and withdraw the pending one-shot.
    pub fn abort(&self) {
        self.timer.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.timer.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.timer.interval()
    }

    /// Change the interval from the next registration on. Slots are still
    /// counted from the original start instant.
    pub fn set_interval(&self, interval: Duration) -> Result<(), TimerError> {
        self.timer.set_interval(interval)
    }

    pub fn fired(&self) -> u64 {
        self.timer.fired()
    }

    pub fn pending_handle(&self) -> Option<TimerHandle> {
        self.timer.pending_handle()
    }
}
