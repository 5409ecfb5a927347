//! `Generic_HTTP` sink (v2, push)
//!
//! POSTs newline-delimited JSON batches to a configured URL. Batching and
//! concurrency come from the consumer's [`DeliveryPipeline`]; a failed POST is
//! logged by the pipeline and never retried.
//!
//! ```yaml
//! consumers:
//!   - name: collector
//!     type: Generic_HTTP
//!     config:
//!       url: https://collector.example.com/ingest
//!       timeout: 10s
//!       headers:
//!         X-Source: bigip
//!       auth:
//!         type: bearer
//!         tokenEnv: COLLECTOR_TOKEN
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::parse_duration;
use crate::data::{DataContext, DataMask, DataPayload};
use crate::pipeline::{DeliveryPipeline, Transport};
use crate::plugins::api::{
    ConsumerContext, ConsumerInstance, ConsumerModule, InstanceMethod, ModuleContext,
    ModuleLoader, ModuleMethod,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CONTENT_TYPE: &str = "application/x-ndjson";

/// Consumer config of the `Generic_HTTP` sink
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSinkConfig {
    pub url: String,

    /// Request timeout (e.g., "5s")
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// Authentication configuration; secrets are read from environment variables
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: AuthType,

    /// Token from environment variable (for bearer and api_key)
    #[serde(default, alias = "token_env")]
    pub token_env: Option<String>,

    /// Username (for basic auth)
    #[serde(default)]
    pub username: Option<String>,

    /// Password from environment variable (for basic auth)
    #[serde(default, alias = "password_env")]
    pub password_env: Option<String>,

    /// Header name (for api_key)
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    Bearer,
    Basic,
    ApiKey,
}

impl HttpSinkConfig {
    pub fn from_consumer_config(config: &Value) -> Result<Self> {
        serde_json::from_value(config.clone()).context("invalid Generic_HTTP config")
    }
}

/// Entry point of the `Generic_HTTP` sink
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpLoader;

#[async_trait]
impl ModuleLoader for HttpLoader {
    async fn load(&self, context: &ModuleContext) -> Result<Arc<dyn ConsumerModule>> {
        context.logger.verbose("http module loaded");
        Ok(Arc::new(HttpModule))
    }
}

struct HttpModule;

#[async_trait]
impl ConsumerModule for HttpModule {
    fn exports(&self) -> &'static [ModuleMethod] {
        ModuleMethod::ALL
    }

    fn create_consumer(&self, context: Arc<ConsumerContext>) -> Result<Arc<dyn ConsumerInstance>> {
        let config = HttpSinkConfig::from_consumer_config(&context.origin_config)?;
        let transport = Arc::new(HttpTransport::new(config)?);
        let pipeline =
            DeliveryPipeline::new(context.logger.clone(), context.pipeline.clone(), transport);
        Ok(Arc::new(HttpConsumer { pipeline }))
    }
}

struct HttpConsumer {
    pipeline: DeliveryPipeline,
}

#[async_trait]
impl ConsumerInstance for HttpConsumer {
    fn exports(&self) -> &'static [InstanceMethod] {
        InstanceMethod::ALL
    }

    async fn on_data(&self, payload: DataPayload, mask: &DataMask) -> Result<Option<Value>> {
        for context in payload.contexts() {
            self.pipeline.push(Arc::new(mask.apply(context)))?;
        }
        Ok(None)
    }

    async fn on_unload(&self) -> Result<()> {
        // queued batches still go out, bounded by the request timeout
        self.pipeline.close();
        self.pipeline.flush().await;
        Ok(())
    }
}

/// Wire side of the `Generic_HTTP` sink
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: BTreeMap<String, String>,
    auth: Option<AuthConfig>,
}

impl HttpTransport {
    pub fn new(config: HttpSinkConfig) -> Result<Self> {
        let timeout = match &config.timeout {
            Some(timeout) => parse_duration(timeout)?,
            None => DEFAULT_TIMEOUT,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::debug!("Created HTTP transport for: {}", config.url);

        Ok(Self {
            client,
            url: config.url,
            headers: config.headers,
            auth: config.auth,
        })
    }

    fn request(&self, body: Vec<u8>) -> Result<reqwest::RequestBuilder> {
        let mut req = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body);
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        self.apply_auth(req)
    }

    /// Apply authentication to a request
    fn apply_auth(&self, mut req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        if let Some(auth) = &self.auth {
            match auth.auth_type {
                AuthType::None => {}
                AuthType::Bearer => {
                    let token = get_env_var(&auth.token_env, "tokenEnv")?;
                    req = req.bearer_auth(token);
                }
                AuthType::Basic => {
                    let username = auth
                        .username
                        .clone()
                        .context("username required for basic auth")?;
                    let password = get_env_var(&auth.password_env, "passwordEnv")?;
                    req = req.basic_auth(username, Some(password));
                }
                AuthType::ApiKey => {
                    let header = auth
                        .header
                        .clone()
                        .context("header required for api_key auth")?;
                    let token = get_env_var(&auth.token_env, "tokenEnv")?;
                    req = req.header(header, token);
                }
            }
        }

        Ok(req)
    }
}

/// Get environment variable value
fn get_env_var(env_var: &Option<String>, field_name: &str) -> Result<String> {
    let var_name = env_var
        .as_ref()
        .with_context(|| format!("{} required for this auth type", field_name))?;

    std::env::var(var_name).with_context(|| {
        format!(
            "Environment variable {} not set (required for auth)",
            var_name
        )
    })
}

#[async_trait]
impl Transport for HttpTransport {
    fn encode(&self, context: &DataContext) -> Result<Vec<Vec<u8>>> {
        Ok(vec![super::ndjson_line(context)?])
    }

    async fn send(&self, payload: Vec<u8>) -> Result<()> {
        let resp = self
            .request(payload)?
            .send()
            .await
            .with_context(|| format!("Failed to POST to: {}", self.url))?;

        if !resp.status().is_success() {
            anyhow::bail!("HTTP request failed: {} (status: {})", self.url, resp.status());
        }

        Ok(())
    }
}
