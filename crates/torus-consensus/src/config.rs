//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use torus_integrity::IntegrityConfig;
use torus_topology::AgentId;

use crate::error::{ConsensusError, Result};
use crate::quorum::DEFAULT_THRESHOLD;

/// What to do when a proposer has no occupied neighbor cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "pool")]
pub enum IsolationPolicy {
    /// No jury, no quorum: the proposal is rejected with score 0.
    #[default]
    Reject,
    /// Count only the proposer's own approval.
    AutoApprove,
    /// Poll these agents instead of lattice neighbors.
    FallbackPool(Vec<AgentId>),
}

impl FromStr for IsolationPolicy {
    type Err = ConsensusError;

    /// Parses `reject`, `approve`, or `fallback:a,b,c`. The policy name is
    /// case-insensitive; agent ids are kept as written.
    fn from_str(s: &str) -> Result<Self> {
        const FALLBACK: &str = "fallback:";

        let s = s.trim();
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "reject" => return Ok(IsolationPolicy::Reject),
            "approve" | "auto_approve" | "auto-approve" => return Ok(IsolationPolicy::AutoApprove),
            _ => {}
        }
        if lower.starts_with(FALLBACK) {
            // ASCII lowercasing keeps byte offsets
            let pool = &s[FALLBACK.len()..];
            let agents: Vec<AgentId> = pool
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(AgentId::from)
                .collect();
            if agents.is_empty() {
                return Err(ConsensusError::Config("fallback pool is empty".into()));
            }
            return Ok(IsolationPolicy::FallbackPool(agents));
        }
        Err(ConsensusError::Config(format!("unknown isolation policy: {s}")))
    }
}

/// Configuration for a consensus engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    /// Minimum approval fraction, in (0, 1]
    pub threshold: f64,

    /// Upper bound on each validator call
    pub vote_timeout: Duration,

    /// Count the proposer's own approval (self-endorsement)
    pub count_proposer_vote: bool,

    /// Handling of proposers with no neighbors
    pub isolation_policy: IsolationPolicy,

    /// Keep counted votes after finalization for auditing (off by default)
    pub retain_votes: bool,

    /// Buffer size of the event broadcast channel
    pub event_capacity: usize,

    /// Reasoning integrity settings
    pub integrity: IntegrityConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            vote_timeout: Duration::from_secs(5),
            count_proposer_vote: true,
            isolation_policy: IsolationPolicy::Reject,
            retain_votes: false,
            event_capacity: 256,
            integrity: IntegrityConfig::default(),
        }
    }
}

impl ConsensusConfig {
    /// Create config from environment variables with defaults for anything unset.
    ///
    /// - `TORUS_QUORUM_THRESHOLD` (float)
    /// - `TORUS_VOTE_TIMEOUT_MS` (integer milliseconds)
    /// - `TORUS_COUNT_PROPOSER_VOTE` (bool)
    /// - `TORUS_ISOLATION_POLICY` (`reject` | `approve` | `fallback:a,b`)
    /// - `TORUS_RETAIN_VOTES` (bool)
    /// - `TORUS_ALLOW_DANGLING_REFERENCES` (bool)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("TORUS_QUORUM_THRESHOLD") {
            config.threshold = parse("TORUS_QUORUM_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("TORUS_VOTE_TIMEOUT_MS") {
            config.vote_timeout = Duration::from_millis(parse("TORUS_VOTE_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("TORUS_COUNT_PROPOSER_VOTE") {
            config.count_proposer_vote = parse("TORUS_COUNT_PROPOSER_VOTE", &v)?;
        }
        if let Some(v) = lookup("TORUS_ISOLATION_POLICY") {
            config.isolation_policy = v.parse()?;
        }
        if let Some(v) = lookup("TORUS_RETAIN_VOTES") {
            config.retain_votes = parse("TORUS_RETAIN_VOTES", &v)?;
        }
        if let Some(v) = lookup("TORUS_ALLOW_DANGLING_REFERENCES") {
            config.integrity.allow_dangling_references = parse("TORUS_ALLOW_DANGLING_REFERENCES", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_vote_timeout(mut self, timeout: Duration) -> Self {
        self.vote_timeout = timeout;
        self
    }

    pub fn with_isolation_policy(mut self, policy: IsolationPolicy) -> Self {
        self.isolation_policy = policy;
        self
    }

    pub fn with_proposer_vote(mut self, count: bool) -> Self {
        self.count_proposer_vote = count;
        self
    }

    pub fn with_retain_votes(mut self, retain: bool) -> Self {
        self.retain_votes = retain;
        self
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConsensusError::Config(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.vote_timeout.is_zero() {
            return Err(ConsensusError::Config("vote timeout must be non-zero".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConsensusError::Config("event capacity must be non-zero".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConsensusError::Config(format!("{key}={value:?}: {e}")))
}
