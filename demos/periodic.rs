//! Runs a compensating and a naive periodic timer side by side. Both
//! callbacks burn some time; the naive timer drifts, the compensating one
//! stays on whole seconds from its start.

use std::time::Duration;

use minitimer::{ReactorConfig, TimerExt, TokioReactor};
use tokio::time::Instant;
use tracing::info;

const WORK: Duration = Duration::from_millis(120);
const TICKS: u64 = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let (reactor, driver) = TokioReactor::spawn(ReactorConfig::default().with_name("demo"));
    let origin = Instant::now();

    reactor.add_compensation_periodic_timer(Duration::from_secs(1), move |ctx| {
        info!(
            tick = ctx.fired(),
            at = format!("{:.3}", ctx.now().duration_since(origin).as_secs_f64()),
            "compensation timer"
        );
        std::thread::sleep(WORK);
        if ctx.fired() == TICKS {
            ctx.cancel();
        }
        Ok(())
    })?;

    reactor.add_periodic_timer(Duration::from_secs(1), move |ctx| {
        info!(
            tick = ctx.fired(),
            at = format!("{:.3}", ctx.now().duration_since(origin).as_secs_f64()),
            "periodic timer"
        );
        std::thread::sleep(WORK);
        if ctx.fired() == TICKS {
            ctx.cancel();
        }
        Ok(())
    })?;

    tokio::time::sleep(Duration::from_secs(TICKS + 2)).await;
    reactor.shutdown()?;
    driver.await??;
    Ok(())
}
