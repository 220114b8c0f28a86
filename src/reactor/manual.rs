use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::trace;

use crate::reactor::{Action, CallbackError, Deadline, Reactor, TimerHandle, deadline_after};

/// One call to [`Reactor::schedule_one_shot`] as seen by a [`ManualReactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub handle: TimerHandle,
    pub delay: Duration,
    /// Virtual time, since the reactor was created, at which the call was made.
    pub requested_at: Duration,
}

impl Registration {
    /// Virtual time at which the registration becomes due.
    pub fn deadline(&self) -> Duration {
        self.requested_at.saturating_add(self.delay)
    }
}

struct ManualState {
    origin: Instant,
    elapsed: Duration,
    next_handle: u64,
    queue: BinaryHeap<Reverse<Deadline>>,
    pending: HashMap<TimerHandle, Action>,
    registrations: Vec<Registration>,
}

impl ManualState {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn move_to(&mut self, at: Instant) {
        let elapsed = at.saturating_duration_since(self.origin);
        if elapsed > self.elapsed {
            self.elapsed = elapsed;
        }
    }
}

/// A reactor driven by hand, on a virtual clock.
///
/// Time only moves through [`advance`](Self::advance),
/// [`run_next`](Self::run_next) and [`consume`](Self::consume), and actions run
/// on the thread that calls them. Cloning yields another handle to the same
/// reactor.
#[derive(Clone)]
pub struct ManualReactor {
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualReactor {
    pub fn new() -> Self {
        let state = ManualState {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            next_handle: 1,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
            registrations: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time since the reactor was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Move the clock forward without firing anything, as if the current
    /// callback had been busy for `duration`.
    pub fn consume(&self, duration: Duration) {
        self.lock().elapsed += duration;
    }

    /// Number of registrations that are neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.lock().pending.contains_key(&handle)
    }

    /// Every registration ever made, oldest first.
    pub fn registrations(&self) -> Vec<Registration> {
        self.lock().registrations.clone()
    }

    pub fn last_registration(&self) -> Option<Registration> {
        self.lock().registrations.last().copied()
    }

    /// Fire the earliest pending registration, moving the clock up to its
    /// deadline first. Returns `None` when nothing is pending.
    pub fn run_next(&self) -> Option<Result<TimerHandle, CallbackError>> {
        let (handle, action) = self.pop_due(None)?;
        Some(action().map(|()| handle))
    }

    /// Move the clock forward by `duration`, firing every registration that
    /// falls due on the way, in deadline order. Registrations made by the
    /// fired actions are honoured too if they fall inside the window.
    ///
    /// Returns how many actions ran. The first callback error stops the
    /// advance and is returned; the clock then stays at that action's deadline.
    pub fn advance(&self, duration: Duration) -> Result<usize, CallbackError> {
        let target = deadline_after(self.lock().now(), duration);
        let mut fired = 0;
        while let Some((_, action)) = self.pop_due(Some(target)) {
            action()?;
            fired += 1;
        }
        self.lock().move_to(target);
        Ok(fired)
    }

    fn pop_due(&self, limit: Option<Instant>) -> Option<(TimerHandle, Action)> {
        let mut state = self.lock();
        loop {
            let Reverse(next) = state.queue.peek().copied()?;
            if limit.is_some_and(|limit| next.at > limit) {
                return None;
            }
            state.queue.pop();

            // Cancelled registrations leave a stale heap entry behind.
            let Some(action) = state.pending.remove(&next.handle) else {
                continue;
            };
            state.move_to(next.at);
            trace!(handle = %next.handle, elapsed = ?state.elapsed, "manual reactor firing");
            return Some((next.handle, action));
        }
    }
}

impl Reactor for ManualReactor {
    fn now(&self) -> Instant {
        self.lock().now()
    }

    fn schedule_one_shot(&self, delay: Duration, action: Action) -> TimerHandle {
        let mut state = self.lock();
        let handle = TimerHandle::new(state.next_handle);
        state.next_handle += 1;

        let at = deadline_after(state.now(), delay);
        state.queue.push(Reverse(Deadline { at, handle }));
        state.pending.insert(handle, action);
        let requested_at = state.elapsed;
        state.registrations.push(Registration {
            handle,
            delay,
            requested_at,
        });
        trace!(%handle, ?delay, "manual reactor registered one-shot");
        handle
    }

    fn cancel_one_shot(&self, handle: TimerHandle) {
        if self.lock().pending.remove(&handle).is_some() {
            trace!(%handle, "manual reactor cancelled one-shot");
        }
    }
}
