pub mod builder;
pub mod cadence;
pub mod callback;
pub mod compensation;
pub mod one_shot;
pub mod periodic;

use std::time::Duration;

pub use builder::TimerBuilder;
pub use cadence::DEFAULT_RESOLUTION;
pub use callback::TimerCallback;
pub use compensation::CompensationPeriodicTimer;
pub use one_shot::OneShotTimer;
pub use periodic::{PeriodicTimer, TimerContext};

use crate::{
    error::TimerError,
    reactor::{CallbackError, Reactor},
};

/// Timer constructors available on every reactor handle.
pub trait TimerExt: Reactor + Clone + Sized {
    fn add_timer<F>(&self, delay: Duration, callback: F) -> OneShotTimer
    where
        F: FnOnce() -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        OneShotTimer::new(self, delay, callback)
    }

    fn add_periodic_timer<F>(
        &self,
        interval: Duration,
        callback: F,
    ) -> Result<PeriodicTimer, TimerError>
    where
        F: Fn(&TimerContext<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        PeriodicTimer::new(self, interval, callback)
    }

    fn add_compensation_periodic_timer<F>(
        &self,
        interval: Duration,
        callback: F,
    ) -> Result<CompensationPeriodicTimer, TimerError>
    where
        F: Fn(&TimerContext<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        CompensationPeriodicTimer::new(self, interval, callback)
    }
}

impl<R: Reactor + Clone> TimerExt for R {}
