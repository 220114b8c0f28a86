use thiserror::Error;

use crate::reactor::CallbackError;

#[derive(Error, Debug)]
pub enum TimerError {
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("timer callback failed: {0}")]
    Callback(#[source] CallbackError),

    #[error("reactor driver is closed")]
    ReactorClosed,
}
