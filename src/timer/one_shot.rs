use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::reactor::{CallbackError, Reactor, TimerHandle};

/// A callback registered to run once after a delay.
///
/// ```no_run
/// # use std::time::Duration;
/// # use minitimer::{OneShotTimer, ReactorConfig, TokioReactor};
/// # async fn demo() {
/// let (reactor, _driver) = TokioReactor::spawn(ReactorConfig::default());
/// let timer = OneShotTimer::new(&reactor, Duration::from_secs(5), || {
///     // never runs, the timer is cancelled below
///     Ok(())
/// });
/// timer.cancel();
/// # }
/// ```
pub struct OneShotTimer {
    handle: TimerHandle,
    reactor: Arc<dyn Reactor>,
}

impl OneShotTimer {
    pub fn new<R, F>(reactor: &R, delay: Duration, callback: F) -> Self
    where
        R: Reactor + Clone,
        F: FnOnce() -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let reactor: Arc<dyn Reactor> = Arc::new(reactor.clone());
        let handle = reactor.schedule_one_shot(delay, Box::new(callback));
        Self { handle, reactor }
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    /// Ask the reactor not to run the callback. Does nothing if it already ran
    /// or was cancelled before.
    pub fn cancel(&self) {
        debug!(handle = %self.handle, "one-shot timer cancelled");
        self.reactor.cancel_one_shot(self.handle);
    }
}
