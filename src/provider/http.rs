use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::Transport;
use crate::{
    configuration::Config,
    error::{Error, TransportError},
    types::{QueryParams, RawPayload},
};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub struct HTTP {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HTTP {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::from)?;

        Ok(HTTP {
            client,
            base_url,
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::new(
            &config.api_base_url,
            config.api_key.clone(),
            Duration::from_secs(config.timeout),
        )
    }

    fn url(&self, endpoint: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl Transport for HTTP {
    async fn fetch(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<RawPayload, TransportError> {
        let url = self.url(endpoint)?;
        debug!("GET {} {}", url, params.canonical());

        let mut request = self.client.get(url).query(&params.to_query_pairs());
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(RawPayload::Null);
        }

        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| TransportError::Body(e.to_string()))
    }
}
