//! Desired-state document consumed and rewritten by the Terraform provisioner

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub name: String,
    pub exists: bool,
    pub running: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersStatus {
    pub cluster: Vec<ServerStatus>,
}

impl ServersStatus {
    pub fn load(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Error reading the cluster status file at path '{}'", path))?;
        serde_yaml::from_str(&raw).context("Error parsing the cluster status file")
    }

    /// Persist the document as YAML, mode 0644, overwriting any existing file.
    pub fn persist(&self, path: &str) -> Result<()> {
        let raw = serde_yaml::to_string(self).context("Error serializing the cluster status document")?;
        fs::write(path, raw).with_context(|| format!("Error writing the cluster status file at path '{}'", path))?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644))
            .with_context(|| format!("Error setting permissions on the cluster status file at path '{}'", path))?;
        Ok(())
    }

    /// Apply `(exists, running)` to the record named `name`, or to every
    /// record in the cluster when `name` is empty.
    pub fn set_status(&mut self, name: &str, exists: bool, running: bool) {
        let mut matched = false;
        for server in self.cluster.iter_mut() {
            if name.is_empty() || server.name == name {
                server.exists = exists;
                server.running = running;
                matched = true;
            }
        }

        if !matched && !name.is_empty() {
            self.cluster.push(ServerStatus {
                name: name.to_string(),
                exists,
                running,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ServersStatus {
        ServersStatus {
            cluster: vec![
                ServerStatus { name: "n1".to_string(), exists: true, running: true },
                ServerStatus { name: "n2".to_string(), exists: true, running: true },
            ],
        }
    }

    #[test]
    fn set_status_by_name_affects_only_that_record() {
        let mut s = status();
        s.set_status("n1", false, false);
        assert!(!s.cluster[0].exists);
        assert!(!s.cluster[0].running);
        assert!(s.cluster[1].exists);
        assert!(s.cluster[1].running);
    }

    #[test]
    fn set_status_with_empty_name_affects_every_record() {
        let mut s = status();
        s.set_status("", false, false);
        assert!(s.cluster.iter().all(|m| !m.exists && !m.running));
    }

    #[test]
    fn set_status_appends_unknown_name() {
        let mut s = status();
        s.set_status("n3", true, false);
        assert_eq!(s.cluster.len(), 3);
        assert_eq!(s.cluster[2], ServerStatus { name: "n3".to_string(), exists: true, running: false });
    }
}
