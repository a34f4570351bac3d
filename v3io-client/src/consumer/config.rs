//! Consumer-group configuration.

use std::time::Duration;

/// Exponential backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// First delay.
    pub min: Duration,
    /// Delay ceiling.
    pub max: Duration,
    /// Multiplier applied per attempt.
    pub factor: u32,
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.min;
        for _ in 0..attempt {
            delay = delay.saturating_mul(self.factor.max(1));
            if delay >= self.max {
                return self.max;
            }
        }
        delay.min(self.max)
    }
}

/// A bounded retry loop: attempts plus the backoff between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub attempts: u32,
    /// Backoff between attempts.
    pub backoff: Backoff,
}

/// Where a claim starts reading when no committed sequence number exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialLocation {
    /// At the oldest retained record.
    #[default]
    Earliest,
    /// After the newest record.
    Latest,
    /// At the first record at or after a Unix timestamp (seconds).
    Time(u64),
    /// At an explicit sequence number.
    Sequence(u64),
}

/// Session liveness parameters.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Heartbeats older than this make a member's claims eligible for
    /// seizure.
    pub timeout: Duration,
    /// Interval between heartbeat refreshes. Missing three intervals
    /// constitutes loss of session.
    pub heartbeat_interval: Duration,
}

/// Persisted-state mutation parameters.
#[derive(Debug, Clone, Copy)]
pub struct StateConfig {
    /// Retry policy for compare-and-swap races.
    pub modify_retry: RetryPolicy,
}

/// Offset-commit parameters.
#[derive(Debug, Clone, Copy)]
pub struct SequenceNumberConfig {
    /// Interval of the commit timer task.
    pub commit_interval: Duration,
}

/// Record-fetch parameters of one claim.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// Pause between consecutive fetches.
    pub interval: Duration,
    /// Maximum records per fetch.
    pub num_records_in_batch: u64,
    /// Starting position when nothing was committed yet.
    pub initial_location: InitialLocation,
}

/// Per-shard claim parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClaimConfig {
    /// Capacity of the record-batch channel handed to the consumer.
    pub record_batch_chan_size: usize,
    /// Fetch loop parameters.
    pub record_batch_fetch: FetchConfig,
    /// Retry policy for obtaining a shard's starting location.
    pub get_shard_location_retry: RetryPolicy,
}

/// Complete consumer-group configuration.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerGroupConfig {
    /// Session liveness.
    pub session: SessionConfig,
    /// State mutation.
    pub state: StateConfig,
    /// Offset commit.
    pub sequence_number: SequenceNumberConfig,
    /// Per-shard claims.
    pub claim: ClaimConfig,
}

impl Default for ConsumerGroupConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                timeout: Duration::from_secs(10),
                heartbeat_interval: Duration::from_secs(3),
            },
            state: StateConfig {
                modify_retry: RetryPolicy {
                    attempts: 100,
                    backoff: Backoff {
                        min: Duration::from_millis(50),
                        max: Duration::from_secs(1),
                        factor: 4,
                    },
                },
            },
            sequence_number: SequenceNumberConfig {
                commit_interval: Duration::from_secs(10),
            },
            claim: ClaimConfig {
                record_batch_chan_size: 100,
                record_batch_fetch: FetchConfig {
                    interval: Duration::from_millis(250),
                    num_records_in_batch: 10,
                    initial_location: InitialLocation::Earliest,
                },
                get_shard_location_retry: RetryPolicy {
                    attempts: 100,
                    backoff: Backoff {
                        min: Duration::from_millis(50),
                        max: Duration::from_secs(1),
                        factor: 2,
                    },
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsumerGroupConfig::default();
        assert_eq!(config.session.timeout, Duration::from_secs(10));
        assert_eq!(config.session.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.state.modify_retry.attempts, 100);
        assert_eq!(config.sequence_number.commit_interval, Duration::from_secs(10));
        assert_eq!(config.claim.record_batch_chan_size, 100);
        assert_eq!(
            config.claim.record_batch_fetch.initial_location,
            InitialLocation::Earliest
        );
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let backoff = Backoff {
            min: Duration::from_millis(50),
            max: Duration::from_secs(1),
            factor: 4,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(50));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(800));
        assert_eq!(backoff.delay(3), Duration::from_secs(1));
        assert_eq!(backoff.delay(30), Duration::from_secs(1));
    }
}
