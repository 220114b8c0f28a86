//! The one-shot primitive every timer in this crate is built on.
//!
//! A [`Reactor`] owns the run loop: it accepts an [`Action`] to run once after
//! a delay, can forget a registration again, and tells the time. Periodic
//! timers never ask for anything else.

pub mod config;
pub mod manual;
pub mod runtime;

use std::{fmt, time::Duration};

use tokio::time::Instant;

pub use config::{ErrorPolicy, ReactorConfig};
pub use manual::{ManualReactor, Registration};
pub use runtime::{Driver, TokioReactor};

/// Error type returned by timer callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Work handed to a reactor, run at most once.
pub type Action = Box<dyn FnOnce() -> Result<(), CallbackError> + Send + Sync + 'static>;

/// Opaque token for one registration with a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait Reactor: Send + Sync + 'static {
    /// The clock the reactor measures delays against.
    fn now(&self) -> Instant;

    /// Run `action` once, no sooner than `delay` from now.
    fn schedule_one_shot(&self, delay: Duration, action: Action) -> TimerHandle;

    /// Forget a registration. Unknown, fired and already cancelled handles are ignored.
    fn cancel_one_shot(&self, handle: TimerHandle);
}

/// Stand-in for delays the clock cannot represent, about 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + delay`, clamped to [`FAR_FUTURE`] when the sum overflows.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Heap entry shared by the reactor backends. Ties on the deadline fire in
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Deadline {
    pub(crate) at: Instant,
    pub(crate) handle: TimerHandle,
}
