//! Loss/reboot scenarios: take a node (or the whole cluster) down and back up

use super::run;
use crate::config::PgClientConfig;
use crate::error::HarnessError;
use crate::measure::Measurements;
use crate::patroni::PatroniClient;
use crate::provisioner::Provisioner;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Leader,
    SyncStandby,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Destruction,
    Reboot,
}

pub struct LossRebootParams {
    pub target: Target,
    pub kind: Kind,
    pub iterations: i64,
    pub validation_interval: Duration,
    pub pause: Duration,
    pub recover_timeout: Duration,
}

fn table_for(target: Target, kind: Kind) -> &'static str {
    match (target, kind) {
        (Target::Leader, Kind::Destruction) => "tests_leader_loss",
        (Target::Leader, Kind::Reboot) => "tests_leader_reboot",
        (Target::SyncStandby, Kind::Destruction) => "tests_sync_standby_loss",
        (Target::SyncStandby, Kind::Reboot) => "tests_sync_standby_reboot",
        (Target::Cluster, Kind::Destruction) => "tests_cluster_loss",
        (Target::Cluster, Kind::Reboot) => "tests_cluster_reboot",
    }
}

fn resolve_node_name(target: Target, snap: &crate::patroni::ClusterSnapshot) -> Result<String> {
    match target {
        Target::Leader => snap
            .leader()
            .map(|m| m.name.clone())
            .ok_or_else(|| anyhow!("Cluster snapshot has no leader to target")),
        Target::SyncStandby => snap
            .sync_standby()
            .map(|m| m.name.clone())
            .ok_or_else(|| anyhow!("Cluster snapshot has no sync standby to target")),
        Target::Cluster => Ok(String::new()),
    }
}

/// Run a loss or reboot scenario. Returns `Ok(None)` without doing anything
/// when `target == Cluster && kind == Destruction`, which is disallowed.
pub async fn run_loss_reboot(
    pg_conf: PgClientConfig,
    mut patroni_client: PatroniClient,
    provisioner: Arc<dyn Provisioner>,
    params: LossRebootParams,
) -> Result<Option<Measurements>> {
    if params.target == Target::Cluster && params.kind == Kind::Destruction {
        return Ok(None);
    }

    let table = table_for(params.target, params.kind);

    let measurements = run(table, pg_conf, move |_done| async move {
        for _ in 0..params.iterations {
            let snap = patroni_client.get_cluster().await?;
            let node_name = resolve_node_name(params.target, &snap)?;
            let expected = snap.members.len();

            match params.kind {
                Kind::Destruction => provisioner
                    .set_server_status(&node_name, false, true)
                    .await
                    .map_err(HarnessError::ProvisionerFailure)?,
                Kind::Reboot => provisioner
                    .set_server_status(&node_name, true, false)
                    .await
                    .map_err(HarnessError::ProvisionerFailure)?,
            }

            if !params.pause.is_zero() {
                tokio::time::sleep(params.pause).await;
            }

            provisioner
                .set_server_status(&node_name, true, true)
                .await
                .map_err(HarnessError::ProvisionerFailure)?;

            patroni_client.wait_for_healthy(params.recover_timeout, expected).await?;

            if node_name.is_empty() {
                info!(scenario_target = ?params.target, kind = ?params.kind, "Recovered the cluster");
            } else {
                info!(node = %node_name, scenario_target = ?params.target, kind = ?params.kind, "Recovered the node");
            }

            tokio::time::sleep(params.validation_interval).await;
        }
        Ok(())
    })
    .await?;

    Ok(Some(measurements))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_distinct_per_target_and_kind() {
        let combos = [
            (Target::Leader, Kind::Destruction),
            (Target::Leader, Kind::Reboot),
            (Target::SyncStandby, Kind::Destruction),
            (Target::SyncStandby, Kind::Reboot),
            (Target::Cluster, Kind::Reboot),
        ];

        let mut names: Vec<&str> = combos.iter().map(|(t, k)| table_for(*t, *k)).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
