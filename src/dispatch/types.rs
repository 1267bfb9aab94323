//! Request and result types exchanged with the dispatcher.

use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    RateLimited,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "PENDING",
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
            DeliveryStatus::RateLimited => "RATE_LIMITED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(alias = "to")]
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl SendRequest {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Outcome of a dispatch. Replaced, never mutated, as a request progresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub message: String,
    /// Name of the last backend attempted; empty if none was reached.
    pub backend_used: String,
    /// Attempts made on `backend_used` minus one.
    pub retry_count: u32,
    pub status: DeliveryStatus,
    pub tracking_id: String,
}

impl SendResult {
    pub(crate) fn pending(tracking_id: &str) -> Self {
        Self {
            success: false,
            message: "Pending".to_owned(),
            backend_used: String::new(),
            retry_count: 0,
            status: DeliveryStatus::Pending,
            tracking_id: tracking_id.to_owned(),
        }
    }

    pub(crate) fn duplicate(tracking_id: &str) -> Self {
        Self::failed(tracking_id, "Duplicate request detected", "", 0)
    }

    pub(crate) fn sent(tracking_id: &str, backend: &str, retry_count: u32) -> Self {
        Self {
            success: true,
            message: "Email sent successfully".to_owned(),
            backend_used: backend.to_owned(),
            retry_count,
            status: DeliveryStatus::Sent,
            tracking_id: tracking_id.to_owned(),
        }
    }

    pub(crate) fn failed(
        tracking_id: &str,
        message: impl Into<String>,
        backend: &str,
        retry_count: u32,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            backend_used: backend.to_owned(),
            retry_count,
            status: DeliveryStatus::Failed,
            tracking_id: tracking_id.to_owned(),
        }
    }

    pub(crate) fn rate_limited(tracking_id: &str, message: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::RateLimited,
            ..Self::failed(tracking_id, message, "", 0)
        }
    }
}
