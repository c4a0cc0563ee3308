//! Patroni REST adapter
//!
//! Cluster topology discovery, leader/sync-standby/candidate selection,
//! switchover RPC, and a health-convergence wait resilient to transient
//! HTTP failures during the disruption window.

mod client;
mod cluster;

pub use client::PatroniClient;
pub use cluster::{ClusterSnapshot, Member};
