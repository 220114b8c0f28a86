use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, error, trace, warn};

use crate::{
    error::TimerError,
    reactor::{
        Action, Deadline, ErrorPolicy, Reactor, ReactorConfig, TimerHandle, deadline_after,
    },
};

type PendingActions = Arc<DashMap<TimerHandle, Action>>;

/// Below this many queued deadlines the driver never prunes.
const PRUNE_THRESHOLD: usize = 64;

enum DriverCommand {
    Arm(Deadline),
    Shutdown,
}

/// Handle to a reactor running on the tokio runtime.
///
/// Registrations go into a table shared with the [`Driver`]; the driver task
/// sleeps until the earliest deadline and runs expired actions one after
/// another, so callbacks never overlap. Cloning yields another handle to the
/// same driver.
#[derive(Clone)]
pub struct TokioReactor {
    name: Arc<str>,
    next_handle: Arc<AtomicU64>,
    pending: PendingActions,
    command_sender: Sender<DriverCommand>,
}

/// The run loop behind a [`TokioReactor`].
pub struct Driver {
    name: Arc<str>,
    error_policy: ErrorPolicy,
    pending: PendingActions,
    command_receiver: Receiver<DriverCommand>,
    queue: BinaryHeap<Reverse<Deadline>>,
}

impl TokioReactor {
    /// Create a reactor and the driver that must be polled for it to fire anything.
    pub fn new(config: ReactorConfig) -> (Self, Driver) {
        let (command_sender, command_receiver) = async_channel::unbounded();
        let name: Arc<str> = Arc::from(config.name);
        let pending: PendingActions = Arc::new(DashMap::new());

        let reactor = Self {
            name: name.clone(),
            next_handle: Arc::new(AtomicU64::new(1)),
            pending: pending.clone(),
            command_sender,
        };
        let driver = Driver {
            name,
            error_policy: config.error_policy,
            pending,
            command_receiver,
            queue: BinaryHeap::new(),
        };
        (reactor, driver)
    }

    /// Create a reactor and spawn its driver on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn spawn(config: ReactorConfig) -> (Self, JoinHandle<Result<(), TimerError>>) {
        let (reactor, driver) = Self::new(config);
        let join = tokio::spawn(driver.run());
        (reactor, join)
    }

    /// Number of registrations that are neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Stop the driver. Pending registrations are dropped without firing.
    pub fn shutdown(&self) -> Result<(), TimerError> {
        self.command_sender
            .try_send(DriverCommand::Shutdown)
            .map_err(|_| TimerError::ReactorClosed)
    }
}

impl Reactor for TokioReactor {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_one_shot(&self, delay: Duration, action: Action) -> TimerHandle {
        let handle = TimerHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let at = deadline_after(Instant::now(), delay);

        self.pending.insert(handle, action);
        if self
            .command_sender
            .try_send(DriverCommand::Arm(Deadline { at, handle }))
            .is_err()
        {
            warn!(reactor = %self.name, %handle, "driver is closed, dropping one-shot");
            self.pending.remove(&handle);
        } else {
            trace!(reactor = %self.name, %handle, ?delay, "registered one-shot");
        }
        handle
    }

    fn cancel_one_shot(&self, handle: TimerHandle) {
        if self.pending.remove(&handle).is_some() {
            trace!(reactor = %self.name, %handle, "cancelled one-shot");
        }
    }
}

impl Driver {
    /// Serve registrations until [`TokioReactor::shutdown`] is called or every
    /// reactor handle is dropped.
    pub async fn run(mut self) -> Result<(), TimerError> {
        debug!(reactor = %self.name, "driver started");
        let result = self.serve().await;

        let dropped = self.pending.len();
        if dropped > 0 {
            warn!(reactor = %self.name, dropped, "driver stopped with pending one-shots");
        }
        // Pending actions may hold reactor handles; clearing breaks the cycle.
        self.pending.clear();
        debug!(reactor = %self.name, "driver stopped");
        result
    }

    async fn serve(&mut self) -> Result<(), TimerError> {
        loop {
            self.fire_expired(Instant::now())?;

            let next_deadline = self.queue.peek().map(|Reverse(deadline)| deadline.at);
            tokio::select! {
                command = self.command_receiver.recv() => match command {
                    Ok(DriverCommand::Arm(deadline)) => self.arm(deadline),
                    Ok(DriverCommand::Shutdown) | Err(_) => return Ok(()),
                },
                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {}
            }
        }
    }

    fn arm(&mut self, deadline: Deadline) {
        self.queue.push(Reverse(deadline));

        // Cancelled registrations stay queued until their deadline; drop them
        // once they outnumber the live ones.
        let queued = self.queue.len();
        if queued > PRUNE_THRESHOLD && queued > 2 * self.pending.len() {
            let pending = &self.pending;
            self.queue
                .retain(|Reverse(deadline)| pending.contains_key(&deadline.handle));
            trace!(reactor = %self.name, queued, kept = self.queue.len(), "pruned cancelled deadlines");
        }
    }

    fn fire_expired(&mut self, now: Instant) -> Result<(), TimerError> {
        while let Some(Reverse(next)) = self.queue.peek().copied() {
            if next.at > now {
                break;
            }
            self.queue.pop();

            let Some((handle, action)) = self.pending.remove(&next.handle) else {
                continue;
            };
            trace!(reactor = %self.name, %handle, "firing one-shot");
            if let Err(err) = action() {
                match self.error_policy {
                    ErrorPolicy::Log => {
                        error!(reactor = %self.name, %handle, error = %err, "timer callback failed");
                    }
                    ErrorPolicy::Stop => {
                        error!(reactor = %self.name, %handle, error = %err, "timer callback failed, stopping driver");
                        return Err(TimerError::Callback(err));
                    }
                }
            }
        }
        Ok(())
    }
}
