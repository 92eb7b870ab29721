use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailError, MailSession, MailTransport, OutgoingMessage};
use crate::config::{Config, SmtpSecurity};
use crate::models::SenderAccount;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Provider submission endpoint. Every session it opens verifies the server certificate.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    host: String,
    port: u16,
    security: SmtpSecurity,
}

impl SmtpTransport {
    pub fn new(host: impl Into<String>, port: u16, security: SmtpSecurity) -> Self {
        Self {
            host: host.into(),
            port,
            security,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.smtp_host.clone(),
            config.smtp_port,
            config.smtp_security,
        )
    }
}

impl MailTransport for SmtpTransport {
    fn open(&self, sender: &SenderAccount) -> Result<Box<dyn MailSession>, MailError> {
        let builder = match self.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            }
        }
        .map_err(|e| MailError::Connection(format!("Invalid SMTP host {}: {}", self.host, e)))?;

        let creds = Credentials::new(sender.email.clone(), sender.app_password.clone());
        let transport = builder.port(self.port).credentials(creds).build();

        tracing::debug!(
            host = %self.host,
            port = self.port,
            security = ?self.security,
            sender = %sender.email,
            "SMTP session configured"
        );

        Ok(Box::new(SmtpSession { transport }))
    }
}

pub struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), MailError> {
        let email = build_message(message)?;
        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| map_smtp_error(&e))?;

        tracing::debug!(
            to = %message.to,
            code = %response.code(),
            "SMTP accepted message"
        );
        Ok(())
    }
}

/// Build the MIME message: an HTML part, followed by every attachment when present.
pub fn build_message(msg: &OutgoingMessage) -> Result<Message, MailError> {
    let from = parse_mailbox(&msg.from)?;
    let to = parse_mailbox(&msg.to)?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(msg.subject.clone());

    let html = SinglePart::html(msg.html_body.clone());

    let built = if msg.attachments.is_empty() {
        builder.singlepart(html)
    } else {
        let mut mixed = MultiPart::mixed().singlepart(html);
        for attachment in msg.attachments.iter() {
            let content_type = ContentType::parse(&attachment.content_type)
                .or_else(|_| ContentType::parse(FALLBACK_CONTENT_TYPE))
                .map_err(|e| MailError::Build(format!("Invalid content type: {}", e)))?;
            mixed = mixed.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }
        builder.multipart(mixed)
    };

    built.map_err(|e| MailError::Build(e.to_string()))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn map_smtp_error(err: &lettre::transport::smtp::Error) -> MailError {
    let message = err.to_string();
    match err.status().map(|code| code.to_string()) {
        Some(code) if matches!(code.as_str(), "530" | "534" | "535") => MailError::Auth(message),
        Some(_) if err.is_transient() => MailError::Transport(format!("transient: {}", message)),
        Some(_) => MailError::Transport(message),
        // No reply code: the connection or TLS handshake itself failed.
        None => MailError::Connection(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MailAttachment;

    fn message(to: &str, attachments: Vec<MailAttachment>) -> OutgoingMessage {
        OutgoingMessage {
            from: "sender@test.com".to_string(),
            to: to.to_string(),
            subject: "Quarterly update".to_string(),
            html_body: "Hello<br><br>Best,<br>Me".to_string(),
            attachments: attachments.into(),
        }
    }

    #[test]
    fn test_build_html_message() {
        let email = build_message(&message("a@x.com", vec![])).expect("Should build");
        let raw = String::from_utf8_lossy(&email.formatted()).to_string();

        assert!(raw.contains("From: sender@test.com"));
        assert!(raw.contains("To: a@x.com"));
        assert!(raw.contains("Subject: Quarterly update"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("Hello<br><br>Best,<br>Me"));
        assert!(!raw.contains("multipart/mixed"));
    }

    #[test]
    fn test_build_message_with_attachments() {
        let attachments = vec![
            MailAttachment {
                filename: "report.txt".to_string(),
                content_type: "text/plain".to_string(),
                content: b"numbers".to_vec(),
            },
            MailAttachment {
                filename: "blob.bin".to_string(),
                content_type: "not a mime type".to_string(),
                content: vec![0, 1, 2],
            },
        ];
        let email = build_message(&message("a@x.com", attachments)).expect("Should build");
        let raw = String::from_utf8_lossy(&email.formatted()).to_string();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("report.txt"));
        assert!(raw.contains("blob.bin"));
        assert!(raw.contains("application/octet-stream"));
    }

    #[test]
    fn test_invalid_recipient() {
        let err = build_message(&message("not-an-address", vec![])).unwrap_err();
        match err {
            MailError::InvalidAddress { address, .. } => assert_eq!(address, "not-an-address"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_open_session_is_configuration_only() {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let sender = SenderAccount {
            email: "sender@test.com".to_string(),
            app_password: "pass".to_string(),
        };
        for security in [SmtpSecurity::Tls, SmtpSecurity::StartTls] {
            let port = security.default_port();
            let transport = SmtpTransport::new("smtp.example.com", port, security);
            assert!(transport.open(&sender).is_ok());
        }
    }
}
