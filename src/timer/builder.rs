use std::time::Duration;

use crate::{
    error::TimerError,
    reactor::Reactor,
    timer::{
        CompensationPeriodicTimer, PeriodicTimer, cadence::DEFAULT_RESOLUTION,
        callback::TimerCallback,
    },
    utils,
};

/// Options for a periodic timer, validated when the timer is spawned.
#[derive(Debug, Clone, Copy)]
pub struct TimerBuilder {
    interval: Duration,
    resolution: Duration,
}

impl TimerBuilder {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            resolution: DEFAULT_RESOLUTION,
        }
    }

    pub fn with_interval_secs(secs: f64) -> Result<Self, TimerError> {
        Ok(Self::new(utils::seconds(secs)?))
    }

    /// Only used by compensating timers.
    pub fn with_resolution(&mut self, resolution: Duration) -> &mut Self {
        self.resolution = resolution;
        self
    }

    pub fn with_resolution_secs(&mut self, secs: f64) -> Result<&mut Self, TimerError> {
        self.resolution = utils::seconds(secs)?;
        Ok(self)
    }

    pub fn spawn_periodic<R, C>(self, reactor: &R, callback: C) -> Result<PeriodicTimer, TimerError>
    where
        R: Reactor + Clone,
        C: TimerCallback,
    {
        PeriodicTimer::new(reactor, self.interval, callback)
    }

    pub fn spawn_compensated<R, C>(
        self,
        reactor: &R,
        callback: C,
    ) -> Result<CompensationPeriodicTimer, TimerError>
    where
        R: Reactor + Clone,
        C: TimerCallback,
    {
        CompensationPeriodicTimer::with_resolution(reactor, self.interval, self.resolution, callback)
    }
}
