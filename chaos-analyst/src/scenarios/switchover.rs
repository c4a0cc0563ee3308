//! Switchover scenario: repeatedly force an exclusive leader change

use super::run;
use crate::config::PgClientConfig;
use crate::measure::Measurements;
use crate::patroni::PatroniClient;
use anyhow::Result;
use std::time::Duration;

pub struct SwitchoverParams {
    pub iterations: i64,
    pub validation_interval: Duration,
    pub change_recover_timeout: Duration,
}

pub async fn run_switchover(
    pg_conf: PgClientConfig,
    mut patroni_client: PatroniClient,
    params: SwitchoverParams,
) -> Result<Measurements> {
    run("tests_switchover", pg_conf, move |_done| async move {
        for _ in 0..params.iterations {
            patroni_client.force_leader_change(params.change_recover_timeout).await?;
            tokio::time::sleep(params.validation_interval).await;
        }
        Ok(())
    })
    .await
}
