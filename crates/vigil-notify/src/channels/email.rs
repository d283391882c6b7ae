use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use crate::error::{NotifyError, Result};
use crate::Notifier;

const MAX_ATTEMPTS: u32 = 3;

/// `[notify.email]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Plain-text email over SMTP (STARTTLS relay).
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::InvalidConfig(format!("smtp_host: {e}")))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        config
            .from
            .parse::<lettre::message::Mailbox>()
            .map_err(|e| NotifyError::InvalidConfig(format!("from: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    fn build_message(&self, recipient: &str, subject: &str, body: &str) -> Result<Message> {
        let from = self
            .from
            .parse()
            .map_err(|e| NotifyError::InvalidConfig(format!("from: {e}")))?;
        let to = recipient
            .parse()
            .map_err(|_| NotifyError::InvalidRecipient(recipient.to_string()))?;
        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::SmtpError(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailChannel {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let email = self.build_message(recipient, subject, body)?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.transport.send(email.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        recipient = %recipient,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            100 * 2u64.pow(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(NotifyError::SmtpError(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
