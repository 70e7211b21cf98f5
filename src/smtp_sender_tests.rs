use crate::alerts::MockAlertPoster;
use crate::config::ConnectionConfig;
use crate::smtp_sender::{
    CERT_ALERT_COOLDOWN_SECONDS, MAIL_CERTIFICATE_ALERT, MockSmtpMailer, MockSmtpMailerFactory,
    SmtpSender, normalize_line_endings,
};
use crate::traits::{MailSender, OutboundMessage, SendError, SendErrorKind, SendOutcome};
use std::sync::Arc;

fn test_connection_config() -> ConnectionConfig {
    ConnectionConfig {
        host: "mail.example.com".to_string(),
        port: 587,
        username: "calendar@example.com".to_string(),
        password: "pass".to_string(),
        use_tls: true,
    }
}

fn test_message() -> OutboundMessage {
    OutboundMessage {
        from_address: "calendar@example.com".to_string(),
        to_address: "user@example.org".to_string(),
        message_id: "MSG-1".to_string(),
        content: b"Subject: Invite\r\n\r\nBody".to_vec(),
    }
}

fn no_alerts_expected() -> Arc<MockAlertPoster> {
    let mut poster = MockAlertPoster::new();
    poster.expect_post_alert().times(0);
    Arc::new(poster)
}

#[tokio::test]
async fn test_send_success() {
    let mut mock_factory = MockSmtpMailerFactory::new();
    mock_factory.expect_create().times(1).returning(|_| {
        let mut mock_mailer = MockSmtpMailer::new();
        mock_mailer
            .expect_send()
            .times(1)
            .withf(|envelope, content| {
                let content_str = String::from_utf8_lossy(content);
                // CRLF must have been normalized away before handoff
                !content_str.contains("\r\n")
                    && content_str == "Subject: Invite\n\nBody"
                    && envelope
                        .from()
                        .is_some_and(|s| s.to_string() == "calendar@example.com")
                    && envelope.to().len() == 1
                    && envelope.to()[0].to_string() == "user@example.org"
            })
            .returning(|_, _| Ok(()));
        Ok(Box::new(mock_mailer))
    });

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        no_alerts_expected(),
    );

    let outcome = sender.send(&test_message()).await;
    assert_eq!(outcome, SendOutcome::Sent);
}

#[tokio::test]
async fn test_send_protocol_failure_does_not_alert() {
    let mut mock_factory = MockSmtpMailerFactory::new();
    mock_factory.expect_create().returning(|_| {
        let mut mock_mailer = MockSmtpMailer::new();
        mock_mailer.expect_send().times(1).returning(|_, _| {
            Err(SendError::new(
                SendErrorKind::Protocol,
                "permanent error (550 5.1.1 no such user)",
            ))
        });
        Ok(Box::new(mock_mailer))
    });

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        no_alerts_expected(),
    );

    let outcome = sender.send(&test_message()).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "permanent error (550 5.1.1 no such user)".to_string(),
            certificate_error: false,
        }
    );
}

#[tokio::test]
async fn test_send_certificate_failure_posts_alert() {
    let mut mock_factory = MockSmtpMailerFactory::new();
    mock_factory.expect_create().returning(|_| {
        let mut mock_mailer = MockSmtpMailer::new();
        mock_mailer.expect_send().times(1).returning(|_, _| {
            Err(SendError::new(
                SendErrorKind::Tls,
                "TLS handshake failed: invalid peer certificate",
            ))
        });
        Ok(Box::new(mock_mailer))
    });

    let mut poster = MockAlertPoster::new();
    poster
        .expect_post_alert()
        .times(1)
        .withf(|kind, cooldown, recipients| {
            kind == MAIL_CERTIFICATE_ALERT && *cooldown == 604_800 && recipients.is_empty()
        })
        .returning(|_, _, _| Ok(()));

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        Arc::new(poster),
    );

    let outcome = sender.send(&test_message()).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "TLS handshake failed: invalid peer certificate".to_string(),
            certificate_error: true,
        }
    );
    assert_eq!(CERT_ALERT_COOLDOWN_SECONDS, 604_800);
}

#[tokio::test]
async fn test_send_factory_error() {
    let mut mock_factory = MockSmtpMailerFactory::new();
    mock_factory.expect_create().returning(|_| {
        Err(SendError::new(
            SendErrorKind::Connection,
            "Connection refused",
        ))
    });

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        no_alerts_expected(),
    );

    let outcome = sender.send(&test_message()).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "Connection refused".to_string(),
            certificate_error: false,
        }
    );
}

#[tokio::test]
async fn test_alert_poster_failure_keeps_outcome() {
    let mut mock_factory = MockSmtpMailerFactory::new();
    mock_factory.expect_create().returning(|_| {
        let mut mock_mailer = MockSmtpMailer::new();
        mock_mailer
            .expect_send()
            .returning(|_, _| Err(SendError::new(SendErrorKind::Tls, "handshake failure")));
        Ok(Box::new(mock_mailer))
    });

    let mut poster = MockAlertPoster::new();
    poster
        .expect_post_alert()
        .times(1)
        .returning(|_, _, _| Err(anyhow::anyhow!("alert sink unavailable")));

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        Arc::new(poster),
    );

    // A broken alert sink must not change the send outcome
    let outcome = sender.send(&test_message()).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            reason: "handshake failure".to_string(),
            certificate_error: true,
        }
    );
}

#[tokio::test]
async fn test_send_invalid_recipient_address() {
    let mock_factory = MockSmtpMailerFactory::new();

    let sender = SmtpSender::new_with_factory(
        test_connection_config(),
        Arc::new(mock_factory),
        no_alerts_expected(),
    );

    let mut message = test_message();
    message.to_address = "not-an-address".to_string();

    let outcome = sender.send(&message).await;
    match outcome {
        SendOutcome::Failed {
            reason,
            certificate_error,
        } => {
            assert!(reason.contains("Invalid recipient address"));
            assert!(!certificate_error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_normalize_line_endings() {
    assert_eq!(
        normalize_line_endings(b"Subject: Invite\r\n\r\nBody"),
        b"Subject: Invite\n\nBody".to_vec()
    );
    assert_eq!(normalize_line_endings(b""), Vec::<u8>::new());
    assert_eq!(normalize_line_endings(b"no endings"), b"no endings".to_vec());
    // Lone carriage returns survive
    assert_eq!(normalize_line_endings(b"a\rb"), b"a\rb".to_vec());
    // Trailing bare CR is not half of a pair
    assert_eq!(normalize_line_endings(b"a\r\n\r"), b"a\n\r".to_vec());
    assert_eq!(normalize_line_endings(b"\r\n\r\n"), b"\n\n".to_vec());
}
