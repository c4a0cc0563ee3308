//! Measurement loop: a detector tester running concurrently with a disruption driver
//!
//! Spawns a `tokio` task that drives a [`Tester`] until the caller-supplied
//! `CancellationToken` fires, accumulating [`Measurements`] the whole time.

mod updater;

pub use updater::Updater;

use crate::config::PgClientConfig;
use crate::error::HarnessError;
use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    None,
    LostTransaction,
    GhostTransaction,
}

/// Result of a single `Tester::run` iteration.
///
/// `anomaly` and `error` are independent: a tester can classify an anomaly
/// from an observed row and then still fail committing it, so both fields
/// must survive together instead of collapsing into a single `Result`.
#[derive(Debug)]
pub struct RunOutcome {
    pub anomaly: Anomaly,
    pub error: Option<anyhow::Error>,
}

impl RunOutcome {
    pub fn ok(anomaly: Anomaly) -> Self {
        Self { anomaly, error: None }
    }

    pub fn err(anomaly: Anomaly, error: anyhow::Error) -> Self {
        Self { anomaly, error: Some(error) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Outages {
    pub count: i64,
    pub total_duration: Duration,
    pub longest: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Measurements {
    pub total_ops: i64,
    pub lost_ops: i64,
    pub ghost_ops: i64,
    pub outages: Outages,
}

impl std::fmt::Display for Measurements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total Ops: {}", self.total_ops)?;
        writeln!(f, "Lost Ops: {}", self.lost_ops)?;
        writeln!(f, "Ghost Ops: {}", self.ghost_ops)?;
        writeln!(f, "Outages:")?;
        writeln!(f, "\tCount: {}", self.outages.count)?;
        writeln!(f, "\tCumulative Duration: {:?}", self.outages.total_duration)?;
        write!(f, "\tLongest One: {:?}", self.outages.longest)
    }
}

#[derive(Debug, Default)]
pub struct MeasureResult {
    pub measurements: Measurements,
    pub error: Option<anyhow::Error>,
}

/// A detector run concurrently with a disruption scenario. Implementations
/// own their own connections; nothing here is shared across iterations.
#[async_trait]
pub trait Tester: Send {
    async fn initialize(&mut self, conf: &PgClientConfig) -> Result<()>;
    async fn run(&mut self, conf: &PgClientConfig) -> RunOutcome;
    async fn cleanup(&mut self, conf: &PgClientConfig) -> Result<()>;
    fn id(&self) -> &str;
}

/// Drive `tester` until `done` is cancelled, accumulating measurements.
///
/// The returned task never fails the caller's `.await`: all error
/// information is carried inside `MeasureResult`, mirroring the original
/// harness's single result channel.
pub fn measure(
    mut tester: Box<dyn Tester>,
    conf: PgClientConfig,
    done: CancellationToken,
) -> JoinHandle<MeasureResult> {
    tokio::spawn(async move {
        if let Err(e) = tester.initialize(&conf).await {
            let error = Some(HarnessError::InitializeFailure(e).into());
            return MeasureResult { measurements: Measurements::default(), error };
        }

        let mut measurements = Measurements::default();
        let mut outage_since: Option<Instant> = None;

        loop {
            if done.is_cancelled() {
                if let Err(e) = tester.cleanup(&conf).await {
                    warn!(tester = tester.id(), error = %e, "Test cleanup failed");
                }
                return MeasureResult { measurements, error: None };
            }

            let outcome = tester.run(&conf).await;
            measurements.total_ops += 1;

            match outcome.anomaly {
                Anomaly::LostTransaction => {
                    measurements.lost_ops += 1;
                    info!(tester = tester.id(), "Tester lost a committed transaction");
                }
                Anomaly::GhostTransaction => {
                    measurements.ghost_ops += 1;
                    info!(tester = tester.id(), "Tester successfully committed a transaction that was marked a failure");
                }
                Anomaly::None => {}
            }

            match &outcome.error {
                Some(e) => {
                    if outage_since.is_none() {
                        info!(tester = tester.id(), error = %e, "Tester outage started");
                        outage_since = Some(Instant::now());
                        measurements.outages.count += 1;
                    }
                }
                None => {
                    if let Some(since) = outage_since.take() {
                        let duration = since.elapsed();
                        measurements.outages.longest = measurements.outages.longest.max(duration);
                        measurements.outages.total_duration += duration;
                        info!(tester = tester.id(), duration = ?duration, "Tester noticed a postgres outage");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pg_conf() -> PgClientConfig {
        PgClientConfig {
            endpoint: "unused:5432".to_string(),
            database: "unused".to_string(),
            auth: Default::default(),
            connection_timeout: Duration::from_secs(1),
            query_timeout: Duration::from_secs(1),
        }
    }

    struct ScriptedTester {
        calls: Arc<AtomicUsize>,
        script: Vec<RunOutcome>,
    }

    fn ok(anomaly: Anomaly) -> RunOutcome {
        RunOutcome::ok(anomaly)
    }

    fn fail(anomaly: Anomaly) -> RunOutcome {
        RunOutcome::err(anomaly, anyhow::anyhow!("scripted failure"))
    }

    #[async_trait]
    impl Tester for ScriptedTester {
        async fn initialize(&mut self, _conf: &PgClientConfig) -> Result<()> {
            Ok(())
        }

        async fn run(&mut self, _conf: &PgClientConfig) -> RunOutcome {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(i) {
                Some(RunOutcome { anomaly, error: Some(_) }) => RunOutcome::err(*anomaly, anyhow::anyhow!("scripted failure")),
                Some(RunOutcome { anomaly, error: None }) => RunOutcome::ok(*anomaly),
                None => RunOutcome::ok(Anomaly::None),
            }
        }

        async fn cleanup(&mut self, _conf: &PgClientConfig) -> Result<()> {
            Ok(())
        }

        fn id(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn outage_is_tracked_across_contiguous_failures() {
        let script = vec![
            ok(Anomaly::None),
            ok(Anomaly::None),
            fail(Anomaly::None),
            fail(Anomaly::None),
            fail(Anomaly::None),
            ok(Anomaly::None),
        ];
        let expected_ops = script.len();
        let calls = Arc::new(AtomicUsize::new(0));
        let tester = Box::new(ScriptedTester { calls: calls.clone(), script });

        let done = CancellationToken::new();
        let handle = measure(tester, pg_conf(), done.clone());

        while calls.load(Ordering::SeqCst) < expected_ops {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        done.cancel();

        let result = handle.await.unwrap();
        assert!(result.error.is_none());
        assert_eq!(result.measurements.total_ops, expected_ops as i64);
        assert_eq!(result.measurements.outages.count, 1);
    }

    #[tokio::test]
    async fn lost_and_ghost_anomalies_are_counted_separately() {
        let script = vec![ok(Anomaly::LostTransaction), ok(Anomaly::GhostTransaction), ok(Anomaly::None)];
        let expected_ops = script.len();
        let calls = Arc::new(AtomicUsize::new(0));
        let tester = Box::new(ScriptedTester { calls: calls.clone(), script });

        let done = CancellationToken::new();
        let handle = measure(tester, pg_conf(), done.clone());

        while calls.load(Ordering::SeqCst) < expected_ops {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        done.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result.measurements.lost_ops, 1);
        assert_eq!(result.measurements.ghost_ops, 1);
        assert_eq!(result.measurements.total_ops, 3);
    }

    #[tokio::test]
    async fn anomaly_is_counted_even_when_the_iteration_errors() {
        let script = vec![fail(Anomaly::LostTransaction), fail(Anomaly::GhostTransaction)];
        let expected_ops = script.len();
        let calls = Arc::new(AtomicUsize::new(0));
        let tester = Box::new(ScriptedTester { calls: calls.clone(), script });

        let done = CancellationToken::new();
        let handle = measure(tester, pg_conf(), done.clone());

        while calls.load(Ordering::SeqCst) < expected_ops {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        done.cancel();

        let result = handle.await.unwrap();
        assert_eq!(result.measurements.lost_ops, 1);
        assert_eq!(result.measurements.ghost_ops, 1);
        assert_eq!(result.measurements.total_ops, 2);
        assert_eq!(
            result.measurements.total_ops,
            result.measurements.lost_ops + result.measurements.ghost_ops
        );
    }

    #[tokio::test]
    async fn initialize_failure_short_circuits_with_error() {
        struct FailsToInit;

        #[async_trait]
        impl Tester for FailsToInit {
            async fn initialize(&mut self, _conf: &PgClientConfig) -> Result<()> {
                Err(anyhow::anyhow!("cannot connect"))
            }
            async fn run(&mut self, _conf: &PgClientConfig) -> RunOutcome {
                RunOutcome::ok(Anomaly::None)
            }
            async fn cleanup(&mut self, _conf: &PgClientConfig) -> Result<()> {
                Ok(())
            }
            fn id(&self) -> &str {
                "fails-to-init"
            }
        }

        let done = CancellationToken::new();
        let handle = measure(Box::new(FailsToInit), pg_conf(), done);
        let result = handle.await.unwrap();
        assert!(result.error.is_some());
        assert_eq!(result.measurements.total_ops, 0);
    }
}
