//! Provisioner adapter
//!
//! Applies a desired server-status document (exists, running) to the
//! external infrastructure via an idempotent reconciler tool, abstracted
//! behind the `Provisioner` trait so tests can swap in a double.

mod status;
mod terraform;

pub use status::{ServerStatus, ServersStatus};
pub use terraform::TerraformProvisioner;

use anyhow::Result;
use async_trait::async_trait;

/// The contract a scenario driver uses to mutate external infrastructure.
///
/// `name == ""` means "apply to every record" (cluster-wide scope).
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn set_server_status(&self, name: &str, exists: bool, running: bool) -> Result<()>;
}
