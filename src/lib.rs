//! One-shot, periodic and drift-compensating periodic timers.
//!
//! Every timer is built on a single primitive: a [`Reactor`] that runs an
//! action once after a delay. A [`PeriodicTimer`] re-registers itself one
//! interval after each firing and drifts by whatever the callback and the
//! scheduler cost. A [`CompensationPeriodicTimer`] instead keeps firing on
//! `start + k * interval`, skipping slots it overran.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use minitimer::{ReactorConfig, TimerExt, TokioReactor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), minitimer::TimerError> {
//!     let (reactor, driver) = TokioReactor::spawn(ReactorConfig::default());
//!
//!     reactor.add_compensation_periodic_timer(Duration::from_secs(1), |ctx| {
//!         println!("tick {}", ctx.fired());
//!         if ctx.fired() == 5 {
//!             ctx.cancel();
//!         }
//!         Ok(())
//!     })?;
//!
//!     tokio::time::sleep(Duration::from_secs(6)).await;
//!     reactor.shutdown()?;
//!     driver.await.map_err(|_| minitimer::TimerError::ReactorClosed)?
//! }
//! ```

pub mod error;
pub mod reactor;
pub mod timer;
pub mod utils;

pub use error::TimerError;
pub use reactor::{
    CallbackError, ErrorPolicy, ManualReactor, Reactor, ReactorConfig, TimerHandle, TokioReactor,
};
pub use timer::{
    CompensationPeriodicTimer, DEFAULT_RESOLUTION, OneShotTimer, PeriodicTimer, TimerBuilder,
    TimerCallback, TimerContext, TimerExt,
};
