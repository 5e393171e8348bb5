use std::time::Duration;

use async_trait::async_trait;
use pushwire_storage::{ClientKeys, VapidCredentials};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use time::OffsetDateTime;

use super::{PushTransport, ece, vapid};
use crate::config::WebPushConfig;
use crate::error::{DispatchError, TransportError};

/// Delivers encrypted messages to push services over HTTP.
pub struct WebPushTransport {
    http_client: Client,
    config: WebPushConfig,
}

impl WebPushTransport {
    pub fn new(config: WebPushConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DispatchError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &WebPushConfig {
        &self.config
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(
        &self,
        endpoint: &str,
        keys: &ClientKeys,
        credentials: &VapidCredentials,
        payload: &str,
    ) -> Result<(), TransportError> {
        let body = ece::encrypt(&keys.p256dh, &keys.auth, payload.as_bytes())?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let authorization = vapid::authorization(endpoint, credentials, now)?;

        let response = self
            .http_client
            .post(endpoint)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("TTL", self.config.ttl_secs.to_string())
            .header("Urgency", self.config.urgency.as_str())
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
