//! Webhook notifier for newly discovered deals.

pub mod client;
pub mod error;
pub(crate) mod retry;

pub use client::{DealNotification, WebhookNotifier};
pub use error::NotifyError;
