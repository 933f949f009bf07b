use thiserror::Error;

/// Errors returned by [`WebhookNotifier`](crate::WebhookNotifier).
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-2xx status.
    #[error("webhook returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The configured webhook URL could not be parsed.
    #[error("invalid webhook URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}
