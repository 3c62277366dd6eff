//! Transfer service configuration.
//!
//! Plain structs with defaults; the service never reads the environment
//! itself, the composition root decides what to pass in.

use std::time::Duration;

/// Concurrent transfers allowed per direction.
pub const DEFAULT_MAX_RUNNING: usize = 1;

/// Completions drained from the reactor per tick, so one busy tick cannot
/// starve the rest of the frame.
pub const DEFAULT_PUMP_BUDGET: usize = 5;

/// Upper bound on received download bytes; server-declared content lengths
/// are not trusted past this.
pub const DEFAULT_DOWNLOAD_HARD_CAP: u64 = 20_000_000;

/// Deadline for a running upload before it is bumped back to pending.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(100);

/// Age at which a download that has not completed is failed out.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(100);

/// Safety ceiling for one-off `fetch_to_file` calls.
pub const FETCH_TO_FILE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Retry behavior for transient upload failures.
#[derive(Clone, Debug, Default)]
pub struct RetryConfig {
    /// Requeue attempts before the request is dropped. `None` preserves the
    /// historical behavior: transient upload failures are requeued forever.
    pub max_retries: Option<u32>,
}

impl RetryConfig {
    /// True if another requeue is allowed after `retries` attempts.
    pub fn allows_retry(&self, retries: u32) -> bool {
        match self.max_retries {
            Some(max) => retries < max,
            None => true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// Base URL of the central asset service.
    pub base_url: String,
    /// Base URL of the localhost-scoped endpoint local uploads PUT to.
    pub local_base_url: String,
    /// Name this node advertises when registering temp assets it uploaded.
    pub host_name: String,
    pub max_running_per_direction: usize,
    pub pump_budget: usize,
    pub download_hard_cap: u64,
    /// Default deadline applied to uploads whose caller did not pass one.
    pub upload_timeout: Duration,
    pub download_timeout: Duration,
    pub retry: RetryConfig,
}

impl TransferConfig {
    pub fn new(
        base_url: impl Into<String>,
        local_base_url: impl Into<String>,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            local_base_url: local_base_url.into(),
            host_name: host_name.into(),
            max_running_per_direction: DEFAULT_MAX_RUNNING,
            pump_budget: DEFAULT_PUMP_BUDGET,
            download_hard_cap: DEFAULT_DOWNLOAD_HARD_CAP,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TransferConfig::new("http://assets.example", "http://localhost:12041/asset", "sim1");
        assert_eq!(config.max_running_per_direction, 1);
        assert_eq!(config.pump_budget, 5);
        assert_eq!(config.download_hard_cap, 20_000_000);
        assert_eq!(config.upload_timeout, Duration::from_secs(100));
        assert!(config.retry.max_retries.is_none());
    }

    #[test]
    fn retry_cap_honored() {
        let unbounded = RetryConfig { max_retries: None };
        assert!(unbounded.allows_retry(0));
        assert!(unbounded.allows_retry(10_000));

        let capped = RetryConfig { max_retries: Some(3) };
        assert!(capped.allows_retry(2));
        assert!(!capped.allows_retry(3));
    }
}
