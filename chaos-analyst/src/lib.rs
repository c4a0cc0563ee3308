//! Chaos-testing harness for a Patroni-managed PostgreSQL cluster
//!
//! Drives disruption scenarios (switchovers, node losses, reboots) against a
//! live cluster while a concurrent measurement loop watches for transactions
//! the cluster lost or resurrected.

pub mod config;
pub mod error;
pub mod measure;
pub mod patroni;
pub mod provisioner;
pub mod scenarios;
