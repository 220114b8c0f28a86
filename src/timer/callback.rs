use crate::{reactor::CallbackError, timer::periodic::TimerContext};

/// Work run by a periodic timer on every firing.
///
/// Implemented for every `Fn(&TimerContext) -> Result<(), CallbackError>`
/// closure. Returning an error stops the timer and hands the error to the
/// reactor.
pub trait TimerCallback: Send + Sync + 'static {
    fn call(&self, ctx: &TimerContext<'_>) -> Result<(), CallbackError>;
}

impl<F> TimerCallback for F
where
    F: Fn(&TimerContext<'_>) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    fn call(&self, ctx: &TimerContext<'_>) -> Result<(), CallbackError> {
        self(ctx)
    }
}
