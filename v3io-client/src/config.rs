//! Client configuration types and builders.

/// Default capacity of the request queue.
const DEFAULT_REQUEST_QUEUE_CAPACITY: usize = 1024;
/// Default number of dispatcher workers.
const DEFAULT_NUM_WORKERS: usize = 8;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the request dispatcher.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    request_queue_capacity: usize,
    num_workers: usize,
    max_connections: Option<usize>,
}

impl ClientConfig {
    /// Creates a builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the capacity of the request queue.
    pub fn request_queue_capacity(&self) -> usize {
        self.request_queue_capacity
    }

    /// Returns the number of dispatcher workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Returns the maximum number of in-flight connections, if capped.
    ///
    /// The cap is advisory and independent of any per-host limit the
    /// transport enforces on its own.
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_queue_capacity: DEFAULT_REQUEST_QUEUE_CAPACITY,
            num_workers: DEFAULT_NUM_WORKERS,
            max_connections: None,
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    request_queue_capacity: Option<usize>,
    num_workers: Option<usize>,
    max_connections: Option<usize>,
}

impl ClientConfigBuilder {
    /// Creates a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of the request queue.
    pub fn request_queue_capacity(mut self, capacity: usize) -> Self {
        self.request_queue_capacity = Some(capacity);
        self
    }

    /// Sets the number of dispatcher workers.
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.num_workers = Some(workers);
        self
    }

    /// Caps the number of in-flight connections across all workers.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Builds the configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the queue capacity, worker count or
    /// connection cap is zero.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let request_queue_capacity = self
            .request_queue_capacity
            .unwrap_or(DEFAULT_REQUEST_QUEUE_CAPACITY);
        let num_workers = self.num_workers.unwrap_or(DEFAULT_NUM_WORKERS);

        if request_queue_capacity == 0 {
            return Err(ConfigError::new("request queue capacity must be > 0"));
        }

        if num_workers == 0 {
            return Err(ConfigError::new("worker count must be > 0"));
        }

        if self.max_connections == Some(0) {
            return Err(ConfigError::new("connection cap must be > 0 when set"));
        }

        Ok(ClientConfig {
            request_queue_capacity,
            num_workers,
            max_connections: self.max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_queue_capacity(), 1024);
        assert_eq!(config.num_workers(), 8);
        assert_eq!(config.max_connections(), None);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .request_queue_capacity(16)
            .num_workers(2)
            .max_connections(4)
            .build()
            .unwrap();
        assert_eq!(config.request_queue_capacity(), 16);
        assert_eq!(config.num_workers(), 2);
        assert_eq!(config.max_connections(), Some(4));
    }

    #[test]
    fn test_builder_rejects_zero_values() {
        assert!(ClientConfig::builder().request_queue_capacity(0).build().is_err());
        assert!(ClientConfig::builder().num_workers(0).build().is_err());
        assert!(ClientConfig::builder().max_connections(0).build().is_err());
    }
}
