//! The `Updater` tester: detects lost and ghost transactions via a single-row counter table

use super::{Anomaly, RunOutcome, Tester};
use crate::config::PgClientConfig;
use crate::error::HarnessError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::fs;
use tokio_postgres::{Client, NoTls};
use tracing::warn;

async fn connect(conf: &PgClientConfig) -> Result<Client> {
    let connect_fut = async {
        if conf.auth.ca_cert.is_empty() {
            let (client, connection) = tokio_postgres::connect(&conf.conn_str(), NoTls)
                .await
                .context("Failed to connect to postgres")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "Postgres connection terminated with an error");
                }
            });
            Ok::<Client, anyhow::Error>(client)
        } else {
            let ca = fs::read(&conf.auth.ca_cert)
                .with_context(|| format!("Failed to read postgres CA certificate file: {}", conf.auth.ca_cert))?;
            let cert = native_tls::Certificate::from_pem(&ca).context("Failed to parse postgres CA certificate")?;
            let connector = TlsConnector::builder()
                .add_root_certificate(cert)
                .build()
                .context("Failed to build postgres TLS connector")?;
            let connector = MakeTlsConnector::new(connector);

            let (client, connection) = tokio_postgres::connect(&conf.conn_str(), connector)
                .await
                .context("Failed to connect to postgres")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "Postgres connection terminated with an error");
                }
            });
            Ok(client)
        }
    };

    tokio::time::timeout(conf.connection_timeout, connect_fut)
        .await
        .map_err(|_| anyhow!("Timed out connecting to postgres"))?
}

/// Single-row counter table, updated once per `run`, used to detect
/// transactions that the harness believed committed but did not survive
/// (lost) or that it believed failed but did survive (ghost).
pub struct Updater {
    table: String,
    index: i64,
}

impl Updater {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), index: 0 }
    }

    /// Pure decision rule behind step 2 of `run`: given the observed row
    /// value (or its absence) and the client's believed `index`, return the
    /// anomaly (if any) and the `index` the client should adopt going forward.
    fn classify(observed: Option<i64>, index: i64) -> (Anomaly, i64) {
        match observed {
            Some(v) if v + 1 < index => (Anomaly::LostTransaction, v + 1),
            Some(v) if v + 1 > index => (Anomaly::GhostTransaction, v + 1),
            Some(_) => (Anomaly::None, index),
            None => (Anomaly::LostTransaction, index),
        }
    }
}

#[async_trait]
impl Tester for Updater {
    async fn initialize(&mut self, conf: &PgClientConfig) -> Result<()> {
        let mut client = connect(conf).await?;
        let tx = tokio::time::timeout(conf.query_timeout, client.transaction())
            .await
            .map_err(|_| anyhow!("Timed out starting the initialize transaction"))??;

        tokio::time::timeout(
            conf.query_timeout,
            tx.execute(&format!("CREATE TABLE {} (value BIGINT NOT NULL)", self.table), &[]),
        )
        .await
        .map_err(|_| anyhow!("Timed out creating the updater table"))??;

        tokio::time::timeout(
            conf.query_timeout,
            tx.execute(&format!("INSERT INTO {}(value) VALUES (0)", self.table), &[]),
        )
        .await
        .map_err(|_| anyhow!("Timed out seeding the updater table"))??;

        tokio::time::timeout(conf.query_timeout, tx.commit())
            .await
            .map_err(|_| anyhow!("Timed out committing the initialize transaction"))??;

        // Matches the original's zero-value index: the first `run` after
        // initialize skips the read-check since `index > 0` is false.
        self.index = 0;
        Ok(())
    }

    async fn run(&mut self, conf: &PgClientConfig) -> RunOutcome {
        let mut client = match connect(conf).await {
            Ok(c) => c,
            Err(e) => return RunOutcome::err(Anomaly::None, HarnessError::DatabaseOp(e).into()),
        };

        let tx = match tokio::time::timeout(conf.query_timeout, client.transaction()).await {
            Ok(Ok(tx)) => tx,
            Ok(Err(e)) => return RunOutcome::err(Anomaly::None, HarnessError::DatabaseOp(e.into()).into()),
            Err(_) => {
                let e = anyhow!("Timed out starting the run transaction");
                return RunOutcome::err(Anomaly::None, HarnessError::DatabaseOp(e).into());
            }
        };

        let mut anomaly = Anomaly::None;

        if self.index > 0 {
            let row = match tokio::time::timeout(
                conf.query_timeout,
                tx.query_opt(&format!("SELECT value FROM {}", self.table), &[]),
            )
            .await
            {
                Ok(Ok(row)) => row,
                Ok(Err(e)) => return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e.into()).into()),
                Err(_) => {
                    let e = anyhow!("Timed out reading the updater row");
                    return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e).into());
                }
            };

            let observed = row.map(|r| r.get::<_, i64>(0));
            let (classified, next_index) = Self::classify(observed, self.index);
            anomaly = classified;
            self.index = next_index;
        }

        let update_result = tokio::time::timeout(
            conf.query_timeout,
            tx.execute(&format!("UPDATE {} SET value = $1", self.table), &[&self.index]),
        )
        .await;

        match update_result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e.into()).into()),
            Err(_) => {
                let e = anyhow!("Timed out updating the updater row");
                return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e).into());
            }
        }

        let commit_result = tokio::time::timeout(conf.query_timeout, tx.commit()).await;
        match commit_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e.into()).into()),
            Err(_) => {
                let e = anyhow!("Timed out committing the run transaction");
                return RunOutcome::err(anomaly, HarnessError::DatabaseOp(e).into());
            }
        }

        self.index += 1;
        RunOutcome::ok(anomaly)
    }

    async fn cleanup(&mut self, conf: &PgClientConfig) -> Result<()> {
        let client = connect(conf).await?;
        tokio::time::timeout(
            conf.query_timeout,
            client.execute(&format!("DROP TABLE IF EXISTS {}", self.table), &[]),
        )
        .await
        .map_err(|_| anyhow!("Timed out dropping the updater table"))??;
        Ok(())
    }

    fn id(&self) -> &str {
        "Updater"
    }
}
