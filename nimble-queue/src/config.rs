use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent workers
    pub max_workers: usize,
    /// Upper bound on retries for any job, whatever the job asks for
    pub max_retries: u32,
    /// Base retry backoff duration
    pub base_retry_backoff: Duration,
    /// Maximum retry backoff duration
    pub max_retry_backoff: Duration,
    /// Capacity of the job event channel
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_retries: 5,
            base_retry_backoff: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(60),
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    /// Set the number of workers
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Set the retry cap
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set base and maximum backoff
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_retry_backoff = base;
        self.max_retry_backoff = max.max(base);
        self
    }

    /// Delay before re-running a job whose `attempt`-th run failed
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_retry_backoff
            .saturating_mul(factor)
            .min(self.max_retry_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = QueueConfig::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(400));
        assert_eq!(config.retry_delay(4), Duration::from_millis(500));
        assert_eq!(config.retry_delay(40), Duration::from_millis(500));
    }

    #[test]
    fn at_least_one_worker() {
        assert_eq!(QueueConfig::default().with_max_workers(0).max_workers, 1);
    }
}
