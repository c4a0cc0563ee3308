//! Core error taxonomy for the harness
//!
//! Adapter and scenario code returns this typed enum; `main` and the bin
//! entrypoint work in terms of `anyhow::Result` the way the rest of the
//! workspace does at its edges.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[source] anyhow::Error),

    #[error("patroni request failed: {0}")]
    TransientHttp(#[source] reqwest::Error),

    #[error("cluster was not healthy within the deadline of {0:?}")]
    Deadline(std::time::Duration),

    #[error("provisioner step failed: {0}")]
    ProvisionerFailure(#[source] anyhow::Error),

    #[error("database operation failed: {0}")]
    DatabaseOp(#[source] anyhow::Error),

    #[error("tester initialization failed: {0}")]
    InitializeFailure(#[source] anyhow::Error),
}
