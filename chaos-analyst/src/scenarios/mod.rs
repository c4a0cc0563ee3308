//! Disruption scenarios: a fixed driver loop running concurrently with a measurement loop
//!
//! Every scenario shares the same two-task skeleton: a measurement task
//! detecting anomalies against the database, and a driver task that mutates
//! the cluster and, on every exit path, cancels the measurement task's
//! lifecycle signal exactly once.

pub mod loss_reboot;
pub mod switchover;

pub use loss_reboot::{run_loss_reboot, Kind, Target};
pub use switchover::run_switchover;

use crate::config::PgClientConfig;
use crate::measure::{measure, Measurements, Tester, Updater};
use anyhow::{anyhow, Context, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Cancels the lifecycle signal when dropped, so a driver that returns early
/// (error or panic unwind) still releases the measurement task.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `driver` against table `table`, spawning a fresh `Updater` measurement
/// loop alongside it, and return the accumulated measurements once both
/// tasks have finished.
pub async fn run<D, Fut>(table: &str, pg_conf: PgClientConfig, driver: D) -> Result<Measurements>
where
    D: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    let done = CancellationToken::new();
    let tester: Box<dyn Tester> = Box::new(Updater::new(table));
    let measure_handle = measure(tester, pg_conf, done.clone());

    let driver_done = done.clone();
    let driver_handle = tokio::spawn(async move {
        let _cancel_on_drop = CancelOnDrop(driver_done.clone());
        driver(driver_done).await
    });

    let driver_result = driver_handle.await;
    let measure_result = measure_handle.await.context("measurement task panicked")?;

    match driver_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(join_err) => return Err(anyhow!("driver task panicked: {join_err}")),
    }

    if let Some(e) = measure_result.error {
        return Err(e);
    }

    Ok(measure_result.measurements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_on_drop_cancels_the_token() {
        let token = CancellationToken::new();
        {
            let _guard = CancelOnDrop(token.clone());
        }
        assert!(token.is_cancelled());
    }
}
