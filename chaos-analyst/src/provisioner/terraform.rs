//! Terraform-backed `Provisioner`
//!
//! Mutates the cluster status document, persists it, then lets `terraform
//! apply` reconcile real infrastructure against the new desired state.

use super::status::ServersStatus;
use super::Provisioner;
use crate::config::TerraformConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::command::terraform;
use std::path::Path;
use tracing::info;

pub struct TerraformProvisioner {
    conf: TerraformConfig,
}

impl TerraformProvisioner {
    pub fn new(conf: TerraformConfig) -> Self {
        Self { conf }
    }

    fn cluster_file_path(&self) -> std::path::PathBuf {
        Path::new(&self.conf.directory).join(&self.conf.cluster_file)
    }

    fn action_label(exists: bool, running: bool) -> &'static str {
        match (exists, running) {
            (true, true) => "set to exist and run",
            (true, false) => "stopped",
            (false, _) => "destroyed",
        }
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn set_server_status(&self, name: &str, exists: bool, running: bool) -> Result<()> {
        let cluster_file = self.cluster_file_path();
        let cluster_file = cluster_file
            .to_str()
            .context("Cluster status file path is not valid UTF-8")?;

        let mut status = ServersStatus::load(cluster_file)
            .with_context(|| format!("Failed to load cluster status from '{}'", cluster_file))?;

        status.set_status(name, exists, running);

        status
            .persist(cluster_file)
            .with_context(|| format!("Failed to persist cluster status to '{}'", cluster_file))?;

        terraform(&self.conf.directory, &["init", "--upgrade"])
            .await
            .context("terraform init failed")?;
        terraform(&self.conf.directory, &["apply", "-auto-approve"])
            .await
            .context("terraform apply failed")?;

        let server = if name.is_empty() { "cluster" } else { name };
        info!(server, "Server {}", Self::action_label(exists, running));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_label_matches_state() {
        assert_eq!(TerraformProvisioner::action_label(true, true), "set to exist and run");
        assert_eq!(TerraformProvisioner::action_label(true, false), "stopped");
        assert_eq!(TerraformProvisioner::action_label(false, true), "destroyed");
        assert_eq!(TerraformProvisioner::action_label(false, false), "destroyed");
    }
}
