use clap::Parser;
use std::time::Duration;

use forwarder_types::{Error, Result};

use crate::pool::PoolConfig;
use crate::protocol::DEFAULT_QUEUE;

/// Forwarding options shared by every transport.
#[derive(Debug, Clone, Parser)]
pub struct ForwarderConfig {
    /// Number of worker tasks running decode and dispatch
    #[clap(long, default_value_t = 5, env = "FORWARDER_CONCURRENCY")]
    pub concurrency: usize,
    /// Maximum number of records submitted but not yet finished.
    /// Intake stalls once this many are outstanding.
    #[clap(long, default_value_t = 1000, env = "FORWARDER_MAX_PENDING")]
    pub max_pending: usize,
    /// Queue for payload-encoded records that do not name one
    #[clap(long, default_value = DEFAULT_QUEUE)]
    pub default_queue: String,
    /// Extra enqueue attempts before a record is marked failed
    #[clap(long, default_value_t = 3)]
    pub dispatch_retries: u32,
    /// Backoff between enqueue attempts, multiplied by the attempt number
    #[clap(long, default_value_t = 100)]
    pub retry_backoff_ms: u64,
    /// How long to let in-flight records drain on shutdown
    #[clap(long, default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_pending: 1000,
            default_queue: DEFAULT_QUEUE.to_string(),
            dispatch_retries: 3,
            retry_backoff_ms: 100,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ForwarderConfig {
    pub fn validate(&self) -> Result<()> {
        self.pool_config().validate()
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency,
            max_pending: self.max_pending,
            dispatch_retries: self.dispatch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_pending < self.concurrency {
            return Err(Error::InvalidConfig(format!(
                "max_pending ({}) must be at least concurrency ({})",
                self.max_pending, self.concurrency
            )));
        }
        Ok(())
    }
}
