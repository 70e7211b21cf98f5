use async_trait::async_trait;
use thiserror::Error;

/// A fully formed RFC-5322 message handed to us by the scheduling layer.
/// `message_id` ties the log records for one send attempt together.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from_address: String,
    pub to_address: String,
    pub message_id: String,
    pub content: Vec<u8>,
}

/// Result of one send attempt. Exactly one of these is produced per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed {
        reason: String,
        certificate_error: bool,
    },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Stable classification of transport failures. The sender matches on this,
/// never on the underlying library's error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    /// DNS resolution or TCP connect failure
    Connection,
    /// TLS handshake or certificate validation failure
    Tls,
    /// Credentials rejected by the server
    Auth,
    /// SMTP-level rejection (bad sender, bad recipient, ...)
    Protocol,
}

#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct SendError {
    kind: SendErrorKind,
    reason: String,
}

impl SendError {
    pub fn new(kind: SendErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> SendErrorKind {
        self.kind
    }
}

#[async_trait]
pub trait MailSender: Send + Sync {
    /// Delivers one message to the configured relay. Never fails the future:
    /// every path resolves to an outcome.
    async fn send(&self, message: &OutboundMessage) -> SendOutcome;
}
