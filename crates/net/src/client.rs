//! HTTP client with connection pooling and the resilience decorator

use crate::resilience::{BreakerRegistry, BreakerSettings, ResiliencePolicy, RetryPolicy};
use edx_config::Config;
use edx_errors::{Error, NetworkError};
use edx_events::EventSender;
use reqwest::{Client, RequestBuilder, Response};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Network client configuration
#[derive(Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub user_agent: String,
    /// Sent as `Authorization: Bearer`; never persisted
    pub bearer_token: Option<String>,
    pub retry: RetryPolicy,
    pub breaker: BreakerSettings,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300), // 5 minutes for large chunks
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: format!("edx/{}", env!("CARGO_PKG_VERSION")),
            bearer_token: None,
            retry: RetryPolicy::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl fmt::Debug for NetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetConfig")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("user_agent", &self.user_agent)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl NetConfig {
    /// Derive client settings from the loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.network.timeout(),
            connect_timeout: config.network.connect_timeout(),
            user_agent: config.network.user_agent.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            breaker: BreakerSettings::from_config(&config.breaker),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }
}

/// HTTP client wrapper; every request goes through the resilience policy
#[derive(Clone)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
    policy: ResiliencePolicy,
}

impl NetClient {
    /// Create a client reporting into the process-wide breaker registry
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let registry = BreakerRegistry::process_wide(config.breaker);
        Self::with_registry(config, registry)
    }

    /// Create a client with its own breaker registry
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn with_registry(config: NetConfig, registry: Arc<BreakerRegistry>) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        let policy = ResiliencePolicy::new(config.retry, registry);
        Ok(Self {
            client,
            config,
            policy,
        })
    }

    /// Issue a request built by `build`, re-building it for every attempt
    ///
    /// # Errors
    ///
    /// See [`ResiliencePolicy::call`].
    pub async fn execute<F>(&self, url: &str, tx: &EventSender, build: F) -> Result<Response, Error>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let client = &self.client;
        let token = self.config.bearer_token.as_deref();
        self.policy
            .call(url, tx, || {
                let mut request = build(client);
                if let Some(token) = token {
                    request = request.bearer_auth(token);
                }
                request.send()
            })
            .await
    }
}
