use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::{
    error::TimerError,
    reactor::{CallbackError, Reactor, TimerHandle},
    timer::{cadence::Cadence, callback::TimerCallback},
    utils::duration_nanos,
};

const NO_HANDLE: u64 = 0;

/// State shared between a periodic timer handle and the action it keeps
/// registered with the reactor.
pub(crate) struct PeriodicCore {
    reactor: Arc<dyn Reactor>,
    callback: Box<dyn TimerCallback>,
    cadence: Cadence,
    interval_nanos: AtomicU64,
    cancelled: AtomicBool,
    pending: AtomicU64,
    fired: AtomicU64,
}

pub(crate) fn validate_interval(interval: Duration) -> Result<u64, TimerError> {
    if interval.is_zero() {
        return Err(TimerError::InvalidInterval(
            "interval must be greater than 0".to_string(),
        ));
    }
    duration_nanos(interval).ok_or_else(|| {
        TimerError::InvalidInterval(format!(
            "interval {interval:?} does not fit in u64 nanoseconds"
        ))
    })
}

impl PeriodicCore {
    /// Build the shared state and make the first registration.
    pub(crate) fn start<C: TimerCallback>(
        reactor: Arc<dyn Reactor>,
        interval: Duration,
        cadence: Cadence,
        callback: C,
    ) -> Result<Arc<Self>, TimerError> {
        let interval_nanos = validate_interval(interval)?;
        let core = Arc::new(Self {
            reactor,
            callback: Box::new(callback),
            cadence,
            interval_nanos: AtomicU64::new(interval_nanos),
            cancelled: AtomicBool::new(false),
            pending: AtomicU64::new(NO_HANDLE),
            fired: AtomicU64::new(0),
        });
        core.schedule();
        Ok(core)
    }

    fn fire(self: &Arc<Self>) -> Result<(), CallbackError> {
        // The registration that got us here is spent.
        self.pending.store(NO_HANDLE, Ordering::SeqCst);
        if self.is_cancelled() {
            trace!("periodic timer fired after cancel, stopping");
            return Ok(());
        }

        self.fired.fetch_add(1, Ordering::Relaxed);
        self.callback.call(&TimerContext { core: self })?;

        // The callback may have cancelled its own timer.
        if self.is_cancelled() {
            debug!("periodic timer cancelled by its callback");
            return Ok(());
        }
        self.schedule();
        Ok(())
    }

    fn schedule(self: &Arc<Self>) {
        let delay = self.cadence.next_delay(self.reactor.now(), self.interval());
        let core = Arc::clone(self);
        let handle = self
            .reactor
            .schedule_one_shot(delay, Box::new(move || core.fire()));
        self.pending.store(handle.id(), Ordering::SeqCst);

        // An abort from another thread between the cancel check in `fire` and
        // the store above found no handle to withdraw.
        if self.is_cancelled() {
            if self
                .pending
                .compare_exchange(handle.id(), NO_HANDLE, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.reactor.cancel_one_shot(handle);
                debug!(%handle, "periodic timer withdrew one-shot armed during abort");
            }
            return;
        }
        trace!(%handle, ?delay, "periodic timer armed");
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos.load(Ordering::Relaxed))
    }

    pub(crate) fn set_interval(&self, interval: Duration) -> Result<(), TimerError> {
        let nanos = validate_interval(interval)?;
        self.interval_nanos.store(nanos, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("periodic timer cancelled");
        }
    }

    pub(crate) fn abort(&self) {
        self.cancel();
        let id = self.pending.swap(NO_HANDLE, Ordering::SeqCst);
        if id != NO_HANDLE {
            let handle = TimerHandle::new(id);
            self.reactor.cancel_one_shot(handle);
            debug!(%handle, "periodic timer aborted pending one-shot");
        }
    }

    pub(crate) fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    pub(crate) fn pending_handle(&self) -> Option<TimerHandle> {
        match self.pending.load(Ordering::SeqCst) {
            NO_HANDLE => None,
            id => Some(TimerHandle::new(id)),
        }
    }
}

/// What a [`TimerCallback`] can see and change about the timer running it.
pub struct TimerContext<'a> {
    core: &'a PeriodicCore,
}

impl TimerContext<'_> {
    /// Stop the timer; the current firing is the last one.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.core.interval()
    }

    /// Takes effect for the registration made right after this callback.
    pub fn set_interval(&self, interval: Duration) -> Result<(), TimerError> {
        self.core.set_interval(interval)
    }

    /// Number of callback runs so far, this one included.
    pub fn fired(&self) -> u64 {
        self.core.fired()
    }

    /// The reactor's clock.
    pub fn now(&self) -> Instant {
        self.core.reactor.now()
    }
}

/// A timer that re-registers itself one interval after every firing.
///
/// Each interval is measured from the moment of re-registration, so the time
/// spent in the callback and any scheduler lag push later firings back. Use
/// [`CompensationPeriodicTimer`](super::CompensationPeriodicTimer) to stay on
/// a fixed grid instead.
///
/// Dropping the value does not stop the timer; call [`cancel`](Self::cancel)
/// or [`abort`](Self::abort).
pub struct PeriodicTimer {
    core: Arc<PeriodicCore>,
}

impl PeriodicTimer {
    /// Create the timer and register its first firing, `interval` from now.
    pub fn new<R, C>(reactor: &R, interval: Duration, callback: C) -> Result<Self, TimerError>
    where
        R: Reactor + Clone,
        C: TimerCallback,
    {
        let reactor: Arc<dyn Reactor> = Arc::new(reactor.clone());
        Self::with_cadence(reactor, interval, Cadence::Fixed, callback)
    }

    pub(crate) fn with_cadence<C: TimerCallback>(
        reactor: Arc<dyn Reactor>,
        interval: Duration,
        cadence: Cadence,
        callback: C,
    ) -> Result<Self, TimerError> {
        let core = PeriodicCore::start(reactor, interval, cadence, callback)?;
        Ok(Self { core })
    }

    /// Stop the timer lazily.
    ///
    /// The one-shot already registered is left in place; when it fires it
    /// notices the cancellation and does nothing.
    pub fn cancel(&self) {
        self.core.cancel();
    }

    /// Stop the timer and withdraw the pending one-shot from the reactor.
    pub fn abort(&self) {
        self.core.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub fn interval(&self) -> Duration {
        self.core.interval()
    }

    /// Change the interval. The one-shot already pending keeps its delay; the
    /// new value is used from the next registration on.
    pub fn set_interval(&self, interval: Duration) -> Result<(), TimerError> {
        self.core.set_interval(interval)
    }

    /// Number of times the callback has run.
    pub fn fired(&self) -> u64 {
        self.core.fired()
    }

    /// Handle of the one-shot currently registered for this timer, if any.
    pub fn pending_handle(&self) -> Option<TimerHandle> {
        self.core.pending_handle()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, atomic::AtomicUsize};

    use super::*;
    use crate::reactor::{Action, ManualReactor};

    fn counting(counter: &Arc<AtomicUsize>) -> impl TimerCallback + use<> {
        let counter = counter.clone();
        move |_: &TimerContext<'_>| -> Result<(), CallbackError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn secs(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    #[test]
    fn test_first_registration_uses_interval() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(2), counting(&counter)).unwrap();

        let registration = reactor.last_registration().unwrap();
        assert_eq!(registration.delay, secs(2));
        assert_eq!(timer.pending_handle(), Some(registration.handle));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let result = PeriodicTimer::new(&reactor, Duration::ZERO, counting(&counter));
        assert!(matches!(result, Err(TimerError::InvalidInterval(_))));
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_fires_every_interval() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();

        assert_eq!(reactor.advance(Duration::from_millis(3500)).unwrap(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(timer.fired(), 3);
        assert_eq!(reactor.pending(), 1);
    }

    #[test]
    fn test_naive_schedule_drifts_with_callback_time() {
        let reactor = ManualReactor::new();
        let clock = reactor.clone();
        let busy = move |_: &TimerContext<'_>| -> Result<(), CallbackError> {
            clock.consume(Duration::from_millis(300));
            Ok(())
        };
        let _timer = PeriodicTimer::new(&reactor, secs(1), busy).unwrap();

        reactor.run_next().unwrap().unwrap();
        reactor.run_next().unwrap().unwrap();

        let deadlines: Vec<_> = reactor
            .registrations()
            .iter()
            .map(|registration| registration.deadline())
            .collect();
        assert_eq!(
            deadlines,
            vec![secs(1), Duration::from_millis(2300), Duration::from_millis(3600)]
        );
    }

    #[test]
    fn test_cancel_leaves_one_noop_firing() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();
        let pending = timer.pending_handle().unwrap();

        timer.cancel();
        assert!(timer.is_cancelled());
        assert!(reactor.is_pending(pending));

        assert_eq!(reactor.run_next().unwrap().unwrap(), pending);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(reactor.pending(), 0);
        assert_eq!(timer.pending_handle(), None);
        assert_eq!(reactor.registrations().len(), 1);
    }

    #[test]
    fn test_cancel_is_monotonic() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();

        reactor.advance(secs(2)).unwrap();
        timer.cancel();
        timer.cancel();
        reactor.advance(secs(10)).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(reactor.registrations().len(), 3);
        assert_eq!(reactor.pending(), 0);
    }

    #[test]
    fn test_abort_withdraws_pending_one_shot() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();
        let pending = timer.pending_handle().unwrap();

        timer.abort();
        assert!(timer.is_cancelled());
        assert!(!reactor.is_pending(pending));
        assert!(reactor.run_next().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_can_cancel_its_timer() {
        let reactor = ManualReactor::new();
        let stop_after_three = |ctx: &TimerContext<'_>| -> Result<(), CallbackError> {
            if ctx.fired() >= 3 {
                ctx.cancel();
            }
            Ok(())
        };
        let timer = PeriodicTimer::new(&reactor, secs(1), stop_after_three).unwrap();

        reactor.advance(secs(10)).unwrap();
        assert_eq!(timer.fired(), 3);
        assert!(timer.is_cancelled());
        assert_eq!(reactor.pending(), 0);
        assert_eq!(reactor.registrations().len(), 3);
    }

    #[test]
    fn test_interval_change_applies_to_next_registration() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();

        timer.set_interval(secs(5)).unwrap();
        assert_eq!(timer.interval(), secs(5));

        // The pending one-shot still fires one second in.
        assert_eq!(reactor.advance(secs(1)).unwrap(), 1);
        assert_eq!(reactor.last_registration().unwrap().delay, secs(5));
        assert_eq!(reactor.advance(secs(4)).unwrap(), 0);
        assert_eq!(reactor.advance(secs(1)).unwrap(), 1);
    }

    #[test]
    fn test_callback_can_change_interval() {
        let reactor = ManualReactor::new();
        let slow_down = |ctx: &TimerContext<'_>| -> Result<(), CallbackError> {
            if ctx.fired() == 1 {
                ctx.set_interval(secs(3))?;
            }
            Ok(())
        };
        let timer = PeriodicTimer::new(&reactor, secs(1), slow_down).unwrap();

        reactor.advance(secs(7)).unwrap();
        let delays: Vec<_> = reactor
            .registrations()
            .iter()
            .map(|registration| registration.delay)
            .collect();
        assert_eq!(delays, vec![secs(1), secs(3), secs(3), secs(3)]);
        assert_eq!(timer.interval(), secs(3));
        assert_eq!(timer.fired(), 3);
    }

    /// Runs a hook right after each registration, before the timer has
    /// recorded the new handle.
    #[derive(Clone)]
    struct HookedReactor {
        inner: ManualReactor,
        hook: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
    }

    impl Reactor for HookedReactor {
        fn now(&self) -> Instant {
            self.inner.now()
        }

        fn schedule_one_shot(&self, delay: Duration, action: Action) -> TimerHandle {
            let handle = self.inner.schedule_one_shot(delay, action);
            let hook = self.hook.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            handle
        }

        fn cancel_one_shot(&self, handle: TimerHandle) {
            self.inner.cancel_one_shot(handle);
        }
    }

    #[test]
    fn test_abort_during_rearm_withdraws_new_one_shot() {
        let inner = ManualReactor::new();
        let reactor = HookedReactor {
            inner: inner.clone(),
            hook: Arc::new(Mutex::new(None)),
        };
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();

        let core = timer.core.clone();
        *reactor.hook.lock().unwrap() = Some(Box::new(move || core.abort()));

        inner.run_next().unwrap().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(inner.registrations().len(), 2);
        assert!(timer.is_cancelled());
        assert_eq!(timer.pending_handle(), None);
        assert_eq!(inner.pending(), 0);
        assert!(inner.run_next().is_none());
    }

    #[test]
    fn test_set_zero_interval_is_rejected() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let timer = PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap();

        assert!(matches!(
            timer.set_interval(Duration::ZERO),
            Err(TimerError::InvalidInterval(_))
        ));
        assert_eq!(timer.interval(), secs(1));
    }

    #[test]
    fn test_failing_callback_stops_timer() {
        let reactor = ManualReactor::new();
        let failing = |_: &TimerContext<'_>| -> Result<(), CallbackError> {
            Err("sensor offline".into())
        };
        let timer = PeriodicTimer::new(&reactor, secs(1), failing).unwrap();

        let err = reactor.advance(secs(5)).unwrap_err();
        assert_eq!(err.to_string(), "sensor offline");
        assert_eq!(timer.fired(), 1);
        assert_eq!(reactor.pending(), 0);
        assert_eq!(timer.pending_handle(), None);
        assert!(!timer.is_cancelled());
    }

    #[test]
    fn test_dropping_handle_keeps_timer_running() {
        let reactor = ManualReactor::new();
        let counter = Arc::new(AtomicUsize::new(0));
        drop(PeriodicTimer::new(&reactor, secs(1), counting(&counter)).unwrap());

        reactor.advance(secs(3)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
