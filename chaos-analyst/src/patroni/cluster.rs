//! Cluster snapshot types returned by `GET /cluster`

use rand::seq::IndexedRandom;
use serde::Deserialize;

/// Lag is reported by Patroni as an integer, but the field is absent for a
/// member with no known lag (e.g. the leader itself). Treat anything that
/// doesn't parse as a plain integer as "unknown" and map it to `-1`.
fn deserialize_lag<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_i64().unwrap_or(-1))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub name: String,
    pub role: String,
    pub state: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i64,
    #[serde(default)]
    pub timeline: i64,
    #[serde(default, deserialize_with = "deserialize_lag")]
    pub lag: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub scope: String,
}

impl ClusterSnapshot {
    /// First member with role `leader`, if any.
    pub fn leader(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.role == "leader")
    }

    /// First member with role `sync_standby`, if any.
    pub fn sync_standby(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.role == "sync_standby")
    }

    /// Preferred candidate for an exclusive switchover: the sync standby if
    /// present, otherwise a uniformly-random replica. `None` if no candidate
    /// exists at all.
    pub fn leader_candidate(&self) -> Option<&Member> {
        if let Some(sync) = self.sync_standby() {
            return Some(sync);
        }

        let replicas: Vec<&Member> = self.members.iter().filter(|m| m.role == "replica").collect();
        replicas.choose(&mut rand::rng()).copied()
    }

    /// A snapshot is healthy when every member is observed running/streaming
    /// with non-negative lag, and the member count matches `expected`.
    pub fn is_healthy(&self, expected: usize) -> bool {
        if self.members.len() != expected {
            return false;
        }

        self.members
            .iter()
            .all(|m| matches!(m.state.as_str(), "running" | "streaming") && m.lag >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, role: &str, state: &str, lag: i64) -> Member {
        Member {
            name: name.to_string(),
            role: role.to_string(),
            state: state.to_string(),
            api_url: String::new(),
            host: String::new(),
            port: 0,
            timeline: 0,
            lag,
        }
    }

    #[test]
    fn lag_sentinel_for_missing_or_non_numeric() {
        let json = r#"{"members": [
            {"name": "n1", "role": "leader", "state": "running"},
            {"name": "n2", "role": "replica", "state": "streaming", "lag": "unknown"},
            {"name": "n3", "role": "replica", "state": "streaming", "lag": 12}
        ]}"#;

        let snap: ClusterSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.members[0].lag, -1);
        assert_eq!(snap.members[1].lag, -1);
        assert_eq!(snap.members[2].lag, 12);
    }

    #[test]
    fn healthy_requires_exact_count_and_good_state() {
        let snap = ClusterSnapshot {
            members: vec![
                member("n1", "leader", "running", 0),
                member("n2", "replica", "streaming", 5),
            ],
            scope: "scope".to_string(),
        };

        assert!(snap.is_healthy(2));
        assert!(!snap.is_healthy(3));
    }

    #[test]
    fn unhealthy_on_bad_state_or_negative_lag() {
        let bad_state = ClusterSnapshot {
            members: vec![member("n1", "leader", "starting", 0)],
            scope: String::new(),
        };
        assert!(!bad_state.is_healthy(1));

        let bad_lag = ClusterSnapshot {
            members: vec![member("n1", "replica", "streaming", -1)],
            scope: String::new(),
        };
        assert!(!bad_lag.is_healthy(1));
    }

    #[test]
    fn leader_candidate_prefers_sync_standby() {
        let snap = ClusterSnapshot {
            members: vec![
                member("n1", "leader", "running", 0),
                member("n2", "sync_standby", "streaming", 0),
                member("n3", "replica", "streaming", 0),
            ],
            scope: String::new(),
        };

        assert_eq!(snap.leader_candidate().unwrap().name, "n2");
    }

    #[test]
    fn leader_candidate_falls_back_to_replica() {
        let snap = ClusterSnapshot {
            members: vec![
                member("n1", "leader", "running", 0),
                member("n2", "replica", "streaming", 0),
            ],
            scope: String::new(),
        };

        assert_eq!(snap.leader_candidate().unwrap().name, "n2");
    }

    #[test]
    fn leader_candidate_none_without_replicas() {
        let snap = ClusterSnapshot {
            members: vec![member("n1", "leader", "running", 0)],
            scope: String::new(),
        };

        assert!(snap.leader_candidate().is_none());
    }
}
