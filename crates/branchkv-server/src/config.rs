//! Server configuration

use branchkv_client::Config as ClientConfig;
use branchkv_core::DEFAULT_MAX_CHAIN_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix, e.g. `BRANCHKV_THRESHOLD=500`
pub const ENV_PREFIX: &str = "BRANCHKV";

/// Server configuration
///
/// Field aliases accept the camel-case names of a legacy `server.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Address peers use to reach this server
    #[serde(alias = "self", alias = "selfAddress")]
    pub self_address: String,
    /// Every server of the cluster, this one included
    pub servers: Vec<String>,
    /// Spare servers that may receive a range on the next split
    #[serde(alias = "availableServers", alias = "availableservers")]
    pub available_servers: Vec<String>,
    /// Owner of the whole key space before the first split
    pub initial: String,
    /// Node count above which this server splits its range
    pub threshold: usize,
    /// Bound on walks toward the root
    #[serde(alias = "maxChainDepth")]
    pub max_chain_depth: usize,
    /// Timeout of a single peer call (milliseconds)
    pub peer_timeout_ms: u64,
    /// Attempts for broadcast calls, the first one included
    pub retry_attempts: u32,
    /// Pause before the first retry (milliseconds), doubled afterwards
    pub retry_backoff_ms: u64,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    /// Host of the serverless action endpoint running merge functions
    pub action_host: Option<String>,
    /// Namespace of merge actions
    pub action_namespace: String,
    /// Basic-auth user of the action endpoint
    pub action_user: Option<String>,
    /// Basic-auth password of the action endpoint
    pub action_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7000,
            self_address: "127.0.0.1:7000".to_string(),
            servers: Vec::new(),
            available_servers: Vec::new(),
            initial: String::new(),
            threshold: 10_000,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            peer_timeout_ms: 5_000,
            retry_attempts: 3,
            retry_backoff_ms: 100,
            max_body_size: 64 * 1024 * 1024, // 64 MB
            action_host: None,
            action_namespace: "guest".to_string(),
            action_user: None,
            action_password: None,
        }
    }
}

impl ServerConfig {
    /// Load from an optional file layered under `BRANCHKV_*` variables
    ///
    /// The file format follows its extension (JSON, TOML, YAML...).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("servers")
                    .with_list_parse_key("available_servers"),
            )
            .build()?
            .try_deserialize()
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Owner of the initial full-range mapping
    pub fn initial_server(&self) -> &str {
        if !self.initial.is_empty() {
            &self.initial
        } else if let Some(first) = self.servers.first() {
            first
        } else {
            &self.self_address
        }
    }

    /// Every configured or spare server except this one
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        for server in self.servers.iter().chain(&self.available_servers) {
            if *server != self.self_address && !peers.contains(server) {
                peers.push(server.clone());
            }
        }
        peers
    }

    /// Pause before the first retry of a broadcast
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Configuration of the pooled peer client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.self_address.as_str())
            .with_timeout(Duration::from_millis(self.peer_timeout_ms))
            .with_retries(self.retry_attempts, self.retry_backoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:7000");
        assert_eq!(config.initial_server(), "127.0.0.1:7000");
        assert_eq!(config.max_chain_depth, DEFAULT_MAX_CHAIN_DEPTH);
    }

    #[test]
    fn test_load_legacy_server_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "servers": ["10.0.0.1:7000", "10.0.0.2:7000", "10.0.0.3:7000"],
                "availableServers": ["10.0.0.3:7000"],
                "self": "10.0.0.1:7000",
                "threshold": 250
            }}"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.self_address, "10.0.0.1:7000");
        assert_eq!(config.available_servers, vec!["10.0.0.3:7000"]);
        assert_eq!(config.threshold, 250);
        assert_eq!(config.initial_server(), "10.0.0.1:7000");
        assert_eq!(config.peers(), vec!["10.0.0.2:7000", "10.0.0.3:7000"]);
        assert_eq!(config.action_namespace, "guest");
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "port = 7100").unwrap();
        writeln!(file, "self_address = \"127.0.0.1:7100\"").unwrap();
        writeln!(file, "initial = \"127.0.0.1:7200\"").unwrap();
        writeln!(file, "retry_attempts = 5").unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.port, 7100);
        assert_eq!(config.initial_server(), "127.0.0.1:7200");
        assert_eq!(config.client_config().max_retries, 5);
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ServerConfig::load(Some(&dir.path().join("absent.json")));
        assert!(result.is_err());
    }
}
