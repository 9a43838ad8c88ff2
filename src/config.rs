//! Harness parameters and exclusion policy selection.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Delay spent inside the critical section by default.
pub const DEFAULT_CRITICAL_DELAY: Duration = Duration::from_millis(100);

/// Unguarded pause between two cycles of a worker by default.
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(50);

/// How workers are kept out of each other's critical sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Test-and-set spinlock, one spin hint per retry. Unbounded and unfair.
    #[default]
    TestAndSet,
    /// Test-and-set spinlock with bounded exponential backoff between retries.
    TestAndSetBackoff,
    /// Lamport's bakery lock, first-come first-served.
    Bakery,
    /// No lock: every worker's cycles run one after another on the
    /// coordinating thread.
    Serialized,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::TestAndSet,
        Policy::TestAndSetBackoff,
        Policy::Bakery,
        Policy::Serialized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::TestAndSet => "tas",
            Policy::TestAndSetBackoff => "tas-backoff",
            Policy::Bakery => "bakery",
            Policy::Serialized => "serial",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Policy::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown policy `{s}`")))
    }
}

/// Parameters of one harness run.
///
/// The default reproduces the classic demonstration: two workers, three
/// cycles each, 100 ms inside the critical section and 50 ms outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub threads: usize,
    pub iterations: usize,
    pub critical_delay: Duration,
    pub pause: Duration,
    pub policy: Policy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            threads: 2,
            iterations: 3,
            critical_delay: DEFAULT_CRITICAL_DELAY,
            pause: DEFAULT_PAUSE,
            policy: Policy::default(),
        }
    }
}

impl HarnessConfig {
    /// `threads` workers doing `iterations` cycles each, with no delays.
    pub fn new(threads: usize, iterations: usize) -> Self {
        HarnessConfig {
            threads,
            iterations,
            critical_delay: Duration::ZERO,
            pause: Duration::ZERO,
            policy: Policy::default(),
        }
    }

    pub fn with_critical_delay(mut self, delay: Duration) -> Self {
        self.critical_delay = delay;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Final counter value a correct run produces.
    pub fn expected(&self) -> Result<u64> {
        u64::try_from(self.threads)
            .ok()
            .zip(u64::try_from(self.iterations).ok())
            .and_then(|(t, i)| t.checked_mul(i))
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "{} threads x {} iterations overflows the counter",
                    self.threads, self.iterations
                ))
            })
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("thread count must be at least 1".into()));
        }
        if self.iterations == 0 {
            return Err(Error::InvalidConfig(
                "iteration count must be at least 1".into(),
            ));
        }
        self.expected().map(|_| ())
    }

    /// Defaults overridden by `SPIN_THREADS`, `SPIN_ITERATIONS` and
    /// `SPIN_POLICY` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = HarnessConfig::default();
        if let Some(threads) = lookup("SPIN_THREADS") {
            config.threads = parse_count("SPIN_THREADS", &threads)?;
        }
        if let Some(iterations) = lookup("SPIN_ITERATIONS") {
            config.iterations = parse_count("SPIN_ITERATIONS", &iterations)?;
        }
        if let Some(policy) = lookup("SPIN_POLICY") {
            config.policy = policy.parse()?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{key}={value:?}: {e}")))
}
