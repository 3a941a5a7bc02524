//! Serverless action invoker
//!
//! Merge functions run as actions on an OpenWhisk-style endpoint. The
//! coordinator only depends on [`ActionInvoker`], so tests swap in mocks.

use crate::config::ServerConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Action invocation errors
#[derive(Error, Debug)]
pub enum InvokerError {
    /// Transport failure
    #[error("action request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a failure status
    #[error("action returned {status}: {body}")]
    Status { status: u16, body: String },

    /// No action endpoint configured
    #[error("no action endpoint configured")]
    NotConfigured,
}

/// Runs a named action on a JSON payload
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Invoke `action` and wait for its JSON result
    async fn invoke(&self, action: &str, payload: Value) -> Result<Value, InvokerError>;
}

/// Blocking invocations over HTTP with basic auth
#[derive(Clone, Debug)]
pub struct HttpActionInvoker {
    http: Client,
    host: Option<String>,
    namespace: String,
    credentials: Option<(String, String)>,
}

impl HttpActionInvoker {
    /// Create an invoker for the action endpoint at `host`
    pub fn new(host: Option<String>, namespace: impl Into<String>, timeout: Duration) -> Result<Self, InvokerError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            host,
            namespace: namespace.into(),
            credentials: None,
        })
    }

    /// Build from the server configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self, InvokerError> {
        // Merge actions can run much longer than a peer call
        let timeout = Duration::from_millis(config.peer_timeout_ms.saturating_mul(12));
        let mut invoker = Self::new(
            config.action_host.clone(),
            config.action_namespace.clone(),
            timeout,
        )?;
        if let Some(user) = &config.action_user {
            invoker = invoker.with_basic_auth(user, config.action_password.clone().unwrap_or_default());
        }
        Ok(invoker)
    }

    /// Set basic-auth credentials
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    fn action_url(&self, host: &str, action: &str) -> String {
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        format!(
            "{}/api/v1/namespaces/{}/actions/{}?blocking=true&result=true",
            base, self.namespace, action
        )
    }
}

#[async_trait]
impl ActionInvoker for HttpActionInvoker {
    #[instrument(skip(self, payload))]
    async fn invoke(&self, action: &str, payload: Value) -> Result<Value, InvokerError> {
        let host = self.host.as_deref().ok_or(InvokerError::NotConfigured)?;
        let url = self.action_url(host, action);
        debug!("Invoking action at {}", url);

        let mut req = self.http.post(&url).json(&payload);
        if let Some((user, pass)) = &self.credentials {
            req = req.basic_auth(user, Some(pass));
        }
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_invoke_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/guest/actions/merge-votes"))
            .and(query_param("blocking", "true"))
            .and(query_param("result", "true"))
            .and(header_exists("authorization"))
            .and(body_json(json!({"location": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nodes": []})))
            .expect(1)
            .mount(&server)
            .await;

        let invoker = HttpActionInvoker::new(Some(server.uri()), "guest", Duration::from_secs(5))
            .unwrap()
            .with_basic_auth("user", "secret");
        let result = invoker
            .invoke("merge-votes", json!({"location": 1}))
            .await
            .unwrap();
        assert_eq!(result, json!({"nodes": []}));
    }

    #[tokio::test]
    async fn test_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("action crashed"))
            .mount(&server)
            .await;

        let invoker =
            HttpActionInvoker::new(Some(server.uri()), "guest", Duration::from_secs(5)).unwrap();
        let err = invoker.invoke("merge", json!({})).await.unwrap_err();
        assert!(matches!(err, InvokerError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let invoker = HttpActionInvoker::new(None, "guest", Duration::from_secs(1)).unwrap();
        let err = invoker.invoke("merge", json!({})).await.unwrap_err();
        assert!(matches!(err, InvokerError::NotConfigured));
    }

    #[test]
    fn test_bare_host_defaults_to_https() {
        let invoker = HttpActionInvoker::new(None, "jobs", Duration::from_secs(1)).unwrap();
        assert_eq!(
            invoker.action_url("172.17.0.1:31001", "reduce"),
            "https://172.17.0.1:31001/api/v1/namespaces/jobs/actions/reduce?blocking=true&result=true"
        );
    }
}
