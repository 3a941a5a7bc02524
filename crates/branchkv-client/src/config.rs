//! Client configuration

use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Server endpoint URL
    pub endpoint: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Attempts for retried calls, the first one included
    pub max_retries: u32,
    /// Pause between retried calls, doubled after each failure
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7000".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("branchkv-client/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint_for(&endpoint.into()),
            ..Default::default()
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Build the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.endpoint
    }
}

/// Turn a server address such as `127.0.0.1:7001` into a base URL
pub fn endpoint_for(address: &str) -> String {
    let trimmed = address.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_for_bare_address() {
        assert_eq!(endpoint_for("127.0.0.1:7001"), "http://127.0.0.1:7001");
        assert_eq!(endpoint_for("https://kv.example/"), "https://kv.example");
    }

    #[test]
    fn test_retries_never_zero() {
        let config = Config::default().with_retries(0, Duration::ZERO);
        assert_eq!(config.max_retries, 1);
    }
}
