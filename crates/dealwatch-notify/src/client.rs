//! HTTP client that POSTs new deals to a webhook.

use std::time::Duration;

use dealwatch_core::{Deal, DealTier, Source};
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NotifyError;
use crate::retry::retry_with_backoff;

/// Longest response body kept in [`NotifyError::UnexpectedStatus`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// JSON body sent for each new deal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealNotification {
    pub hash: String,
    pub merchant: String,
    pub face_value: Decimal,
    pub price: Decimal,
    pub discount_percent: Decimal,
    pub source: Source,
    pub tier: DealTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&Deal> for DealNotification {
    fn from(deal: &Deal) -> Self {
        Self {
            hash: deal.identity_hash.clone(),
            merchant: deal.merchant.clone(),
            face_value: deal.face_value,
            price: deal.price,
            discount_percent: deal.discount_percent,
            source: deal.source,
            tier: deal.tier,
            url: deal.url.clone(),
        }
    }
}

/// Posts [`DealNotification`]s to one webhook endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidUrl`] if `url` is not an absolute
    /// http(s) URL, or [`NotifyError::Http`] if the `reqwest::Client` cannot
    /// be constructed.
    pub fn new(
        url: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, NotifyError> {
        let parsed = Url::parse(url.trim()).map_err(|e| NotifyError::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::InvalidUrl {
                url: url.to_owned(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent(concat!("dealwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: parsed,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Host of the webhook, for log fields. The full URL may carry a token.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    /// Delivers one notification, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`NotifyError::UnexpectedStatus`] for a non-2xx answer (after
    ///   retries when it was a 5xx).
    /// - [`NotifyError::Http`] on network failure or timeout after retries.
    pub async fn post_deal(&self, notification: &DealNotification) -> Result<(), NotifyError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.send_once(notification)
        })
        .await?;

        tracing::debug!(
            host = self.host(),
            hash = %notification.hash,
            merchant = %notification.merchant,
            "posted deal notification"
        );
        Ok(())
    }

    async fn send_once(&self, notification: &DealNotification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect();
        Err(NotifyError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }
}
