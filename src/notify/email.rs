use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::Notifier;
use crate::config::EmailConfig;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    subject_prefix: String,
}

impl EmailNotifier {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .with_context(|| format!("invalid SMTP_HOST '{}'", cfg.host))?
            .credentials(creds)
            .build();

        let from = cfg.from.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = cfg.to.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self {
            mailer,
            from,
            to,
            subject_prefix: cfg.subject_prefix.clone(),
        })
    }
}

/// First non-empty line, used as the subject.
fn subject_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("status update")
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let subject = format!("{} {}", self.subject_prefix, subject_line(text));

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject.trim())
            .header(header::ContentType::TEXT_PLAIN)
            .body(text.to_string())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
