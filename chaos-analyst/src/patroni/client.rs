//! HTTP client wrapping the Patroni REST API

use super::cluster::ClusterSnapshot;
use crate::config::PatroniClientConfig;
use crate::error::HarnessError;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::{Certificate, Client, Identity};
use serde::Serialize;
use std::fs;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::info;

fn switchover_response_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^Successfully switched over to "(?P<leader>.*)"$"#).unwrap())
}

fn build_client(conf: &PatroniClientConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(conf.connection_timeout)
        .timeout(conf.request_timeout)
        .pool_idle_timeout(conf.request_timeout);

    if !conf.auth.ca_cert.is_empty() {
        let ca = fs::read(&conf.auth.ca_cert)
            .with_context(|| format!("Failed to read patroni CA certificate file: {}", conf.auth.ca_cert))?;
        builder = builder.add_root_certificate(
            Certificate::from_pem(&ca).context("Failed to parse patroni CA certificate")?,
        );
    }

    let mut identity_pem = fs::read(&conf.auth.client_cert)
        .with_context(|| format!("Failed to read patroni client certificate: {}", conf.auth.client_cert))?;
    let key_pem = fs::read(&conf.auth.client_key)
        .with_context(|| format!("Failed to read patroni client key: {}", conf.auth.client_key))?;
    identity_pem.extend_from_slice(&key_pem);
    let identity = Identity::from_pem(&identity_pem).context("Failed to load patroni client certificate key pair")?;

    builder
        .identity(identity)
        .build()
        .context("Failed to build patroni HTTP client")
}

#[derive(Debug, Clone, Default)]
pub struct SwitchoverResult {
    pub previous: String,
    pub new: String,
}

#[derive(Serialize)]
struct SwitchoverRequest<'a> {
    leader: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate: Option<&'a str>,
}

/// Client for a single Patroni REST endpoint, scoped to one scenario driver.
pub struct PatroniClient {
    client: Client,
    endpoint: String,
    conf: PatroniClientConfig,
}

impl PatroniClient {
    pub fn new(conf: &PatroniClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(conf)?,
            endpoint: conf.endpoint.clone(),
            conf: conf.clone(),
        })
    }

    pub async fn get_cluster(&self) -> Result<ClusterSnapshot, HarnessError> {
        let url = format!("https://{}/cluster", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(HarnessError::TransientHttp)?;
        resp.json::<ClusterSnapshot>()
            .await
            .map_err(HarnessError::TransientHttp)
    }

    async fn switchover(&self, exclude_leader: bool) -> Result<SwitchoverResult> {
        let snap = self.get_cluster().await?;
        let previous = snap.leader().map(|m| m.name.clone()).unwrap_or_default();

        let candidate = if exclude_leader {
            let candidate = snap
                .leader_candidate()
                .ok_or_else(|| anyhow!("Could not do a switchover that excludes leader: no suitable candidate was found"))?;
            Some(candidate.name.clone())
        } else {
            None
        };

        let body = SwitchoverRequest {
            leader: &previous,
            candidate: candidate.as_deref(),
        };

        let url = format!("https://{}/switchover", self.endpoint);
        let resp = self.client.post(&url).json(&body).send().await?;
        let text = resp.text().await?;

        let new = switchover_response_regex()
            .captures(&text)
            .and_then(|caps| caps.name("leader"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Ok(SwitchoverResult { previous, new })
    }

    /// Poll `get_cluster` until `is_healthy(expected)`, absorbing transient
    /// HTTP errors and rebuilding the client (in case the endpoint's VIP
    /// migrated) until `timeout` elapses.
    pub async fn wait_for_healthy(&mut self, timeout: Duration, expected: usize) -> Result<(), HarnessError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.get_cluster().await {
                Ok(snap) if snap.is_healthy(expected) => return Ok(()),
                Ok(_) => {
                    if Instant::now() >= deadline {
                        return Err(HarnessError::Deadline(timeout));
                    }
                }
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Err(HarnessError::Deadline(timeout));
                    }

                    if let Ok(fresh) = build_client(&self.conf) {
                        self.client = fresh;
                    }
                }
            }
        }
    }

    /// Force an exclusive switchover (candidate != current leader), wait for
    /// the cluster to re-converge, and resolve the new leader's name even if
    /// the switchover response body didn't carry it.
    pub async fn force_leader_change(&mut self, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        let snap = self.get_cluster().await?;
        let mut result = self.switchover(true).await?;

        self.wait_for_healthy(timeout, snap.members.len()).await?;

        if result.new.is_empty() {
            let snap = self.get_cluster().await?;
            result.new = snap.leader().map(|m| m.name.clone()).unwrap_or_default();
        }

        info!(
            previous_leader = %result.previous,
            new_leader = %result.new,
            elapsed = ?start.elapsed(),
            "Switchover completed with healthy cluster"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switchover_response_matches_literal() {
        let re = switchover_response_regex();
        let caps = re.captures(r#"Successfully switched over to "nodeA""#).unwrap();
        assert_eq!(&caps["leader"], "nodeA");
    }

    #[test]
    fn switchover_response_no_match_on_other_text() {
        let re = switchover_response_regex();
        assert!(re.captures("switchover failed").is_none());
    }
}
