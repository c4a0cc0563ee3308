//! Chaos-analyst entrypoint
//!
//! Reads the YAML configuration, then runs each configured disruption
//! scenario in turn: switchovers, leader losses, sync-standby losses, leader
//! reboots, sync-standby reboots, cluster reboots. Any scenario whose count
//! is 0 is skipped. Aborts on the first scenario failure.

use anyhow::Result;
use chaos_analyst::config::load_config;
use chaos_analyst::error::HarnessError;
use chaos_analyst::patroni::PatroniClient;
use chaos_analyst::provisioner::TerraformProvisioner;
use chaos_analyst::scenarios::loss_reboot::{run_loss_reboot, Kind, LossRebootParams, Target};
use chaos_analyst::scenarios::switchover::{run_switchover, SwitchoverParams};
use common::ConfigExt;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = String::env_or("PG_CHAOS_ANALYST_CONFIG_FILE", "config.yml");
    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            println!("Aborting: {:#}", HarnessError::ConfigLoad(e));
            std::process::exit(1);
        }
    };

    let _guard = common::init_logging(&config.log_level);

    let provisioner: Arc<dyn chaos_analyst::provisioner::Provisioner> =
        Arc::new(TerraformProvisioner::new(config.terraform.clone()));

    let tests = &config.tests;

    if tests.switchovers > 0 {
        let patroni_client = match PatroniClient::new(&config.patroni_client) {
            Ok(c) => c,
            Err(e) => abort(e),
        };

        let result = run_switchover(
            config.postgres_client.clone(),
            patroni_client,
            SwitchoverParams {
                iterations: tests.switchovers,
                validation_interval: tests.validation_interval,
                change_recover_timeout: tests.change_recover_timeout,
            },
        )
        .await;

        match result {
            Ok(measurements) => info!("Switchover scenario complete\n{}", measurements),
            Err(e) => abort(e),
        }
    }

    let loss_reboot_scenarios = [
        (tests.leader_losses, Target::Leader, Kind::Destruction, tests.loss_recover_timeout, tests.rebuild_pause),
        (tests.sync_standby_losses, Target::SyncStandby, Kind::Destruction, tests.loss_recover_timeout, tests.rebuild_pause),
        (tests.leader_reboots, Target::Leader, Kind::Reboot, tests.reboot_recover_timeout, tests.restart_pause),
        (tests.sync_standby_reboots, Target::SyncStandby, Kind::Reboot, tests.reboot_recover_timeout, tests.restart_pause),
        (tests.cluster_reboots, Target::Cluster, Kind::Reboot, tests.reboot_recover_timeout, tests.restart_pause),
    ];

    for (iterations, target, kind, recover_timeout, pause) in loss_reboot_scenarios {
        if iterations == 0 {
            continue;
        }

        let patroni_client = match PatroniClient::new(&config.patroni_client) {
            Ok(c) => c,
            Err(e) => abort(e),
        };

        let result = run_loss_reboot(
            config.postgres_client.clone(),
            patroni_client,
            provisioner.clone(),
            LossRebootParams {
                target,
                kind,
                iterations,
                validation_interval: tests.validation_interval,
                pause,
                recover_timeout,
            },
        )
        .await;

        match result {
            Ok(Some(measurements)) => info!(scenario_target = ?target, ?kind, "Scenario complete\n{}", measurements),
            Ok(None) => info!(scenario_target = ?target, ?kind, "Scenario is a no-op, skipping"),
            Err(e) => abort(e),
        }
    }

    Ok(())
}

fn abort(e: anyhow::Error) -> ! {
    error!(error = %e, "Aborting scenario run");
    println!("Aborting: {:#}", e);
    std::process::exit(1);
}
