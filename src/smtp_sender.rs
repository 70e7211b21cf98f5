use crate::alerts::AlertPoster;
use crate::config::ConnectionConfig;
use crate::traits::{MailSender, OutboundMessage, SendError, SendErrorKind, SendOutcome};
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use log::{debug, error, info, warn};
use std::error::Error as _;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const MAIL_CERTIFICATE_ALERT: &str = "MailCertificateAlert";
/// Cooldown for repeated certificate alerts: 7 days.
pub const CERT_ALERT_COOLDOWN_SECONDS: u64 = 7 * 24 * 60 * 60;

// Abstract the mailer so we can mock it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmtpMailer: Send + Sync {
    async fn send(&self, envelope: Envelope, email: &[u8]) -> Result<(), SendError>;
}

// Wrapper for Real Lettre Transport
pub struct RealSmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl SmtpMailer for RealSmtpMailer {
    async fn send(&self, envelope: Envelope, email: &[u8]) -> Result<(), SendError> {
        self.transport
            .send_raw(&envelope, email)
            .await
            .map(|_| ())
            .map_err(|e| classify_smtp_error(&e))
    }
}

// Factory trait
#[cfg_attr(test, mockall::automock)]
pub trait SmtpMailerFactory: Send + Sync {
    fn create(&self, config: &ConnectionConfig) -> Result<Box<dyn SmtpMailer>, SendError>;
}

pub struct RealSmtpMailerFactory;

impl SmtpMailerFactory for RealSmtpMailerFactory {
    fn create(&self, config: &ConnectionConfig) -> Result<Box<dyn SmtpMailer>, SendError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| {
                SendError::new(
                    SendErrorKind::Connection,
                    format!("Invalid SMTP host: {}", e),
                )
            })?
            .port(config.port);

        // Authentication is attempted only when credentials are configured.
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        if config.use_tls {
            let tls_params = TlsParameters::new(config.host.clone()).map_err(|e| {
                SendError::new(SendErrorKind::Tls, format!("Invalid TLS parameters: {}", e))
            })?;
            // The session starts in cleartext and upgrades, so transport
            // security means mandatory STARTTLS rather than wrapped TLS.
            builder = builder.tls(Tls::Required(tls_params));
        } else {
            builder = builder.tls(Tls::None);
        }

        let transport = builder.build();

        Ok(Box::new(RealSmtpMailer { transport }))
    }
}

/// Folds a transport error into our error taxonomy. Walks the source chain
/// looking for rustls and I/O causes, then falls back to matching on the
/// rendered reason.
fn classify_smtp_error(err: &lettre::transport::smtp::Error) -> SendError {
    let mut reason = err.to_string();
    let mut saw_tls = false;
    let mut saw_io = false;

    let mut source = err.source();
    while let Some(cause) = source {
        if cause.downcast_ref::<rustls::Error>().is_some() {
            saw_tls = true;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            saw_io = true;
        }
        reason = format!("{}: {}", reason, cause);
        source = cause.source();
    }

    let lower = reason.to_lowercase();
    let kind = if saw_tls
        || lower.contains("certificate")
        || lower.contains("tls")
        || lower.contains("ssl")
    {
        SendErrorKind::Tls
    } else if lower.contains("auth") || lower.contains("credentials") || lower.contains("535") {
        SendErrorKind::Auth
    } else if saw_io
        || lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("resolve")
        || lower.contains("timed out")
    {
        SendErrorKind::Connection
    } else {
        SendErrorKind::Protocol
    };

    SendError::new(kind, reason)
}

/// Replaces every CRLF pair with a bare LF. Lone carriage returns are left
/// alone. Some relays re-frame the DATA payload and reject CRLF in the raw
/// bytes handed to them.
pub fn normalize_line_endings(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut i = 0;
    while i < content.len() {
        if content[i] == b'\r' && content.get(i + 1) == Some(&b'\n') {
            out.push(b'\n');
            i += 2;
        } else {
            out.push(content[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
#[path = "./smtp_sender_tests.rs"]
mod smtp_sender_tests;

pub struct SmtpSender {
    config: ConnectionConfig,
    factory: Arc<dyn SmtpMailerFactory>,
    mailer: OnceCell<Box<dyn SmtpMailer>>,
    alerts: Arc<dyn AlertPoster>,
}

impl SmtpSender {
    pub fn new(config: ConnectionConfig, alerts: Arc<dyn AlertPoster>) -> Self {
        Self {
            config,
            factory: Arc::new(RealSmtpMailerFactory),
            mailer: OnceCell::new(),
            alerts,
        }
    }

    #[allow(dead_code)]
    pub fn new_with_factory(
        config: ConnectionConfig,
        factory: Arc<dyn SmtpMailerFactory>,
        alerts: Arc<dyn AlertPoster>,
    ) -> Self {
        Self {
            config,
            factory,
            mailer: OnceCell::new(),
            alerts,
        }
    }

    async fn try_send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        let from_addr = message.from_address.parse().map_err(|e| {
            SendError::new(
                SendErrorKind::Protocol,
                format!("Invalid sender address: {}", e),
            )
        })?;

        let to_addr = message.to_address.parse().map_err(|e| {
            SendError::new(
                SendErrorKind::Protocol,
                format!("Invalid recipient address: {}", e),
            )
        })?;

        let envelope = Envelope::new(Some(from_addr), vec![to_addr]).map_err(|e| {
            SendError::new(SendErrorKind::Protocol, format!("Invalid envelope: {}", e))
        })?;

        let content = normalize_line_endings(&message.content);

        let mailer = self
            .mailer
            .get_or_try_init(|| async { self.factory.create(&self.config) })
            .await?;

        debug!("Sending: {}", String::from_utf8_lossy(&content));

        mailer.send(envelope, &content).await
    }
}

#[async_trait]
impl MailSender for SmtpSender {
    async fn send(&self, message: &OutboundMessage) -> SendOutcome {
        match self.try_send(message).await {
            Ok(()) => {
                info!(
                    "Sent IMIP message {} from {} to {}",
                    message.message_id, message.from_address, message.to_address
                );
                SendOutcome::Sent
            }
            Err(e) => {
                error!(
                    "Failed to send IMIP message {} from {} to {} (Reason: {})",
                    message.message_id, message.from_address, message.to_address, e
                );
                let certificate_error = e.kind() == SendErrorKind::Tls;
                if certificate_error {
                    if let Err(alert_err) = self
                        .alerts
                        .post_alert(MAIL_CERTIFICATE_ALERT, CERT_ALERT_COOLDOWN_SECONDS, &[])
                        .await
                    {
                        warn!("Failed to post {}: {}", MAIL_CERTIFICATE_ALERT, alert_err);
                    }
                }
                SendOutcome::Failed {
                    reason: e.to_string(),
                    certificate_error,
                }
            }
        }
    }
}
