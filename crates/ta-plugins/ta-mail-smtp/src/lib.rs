//! # ta-mail-smtp
//!
//! `Notifier` over SMTP. In mock mode messages are only logged; the
//! recording transport keeps them in memory for test suites.

use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use ta_config::{ExposeSecret, MailSettings};
use ta_core::notices::Notice;
use ta_core::traits::Notifier;

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Log,
    Recording(Mutex<Vec<Notice>>),
}

pub struct SmtpNotifier {
    from: Mailbox,
    transport: Transport,
}

impl SmtpNotifier {
    pub fn from_settings(settings: &MailSettings) -> anyhow::Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid mail.from address {:?}: {e}", settings.from))?;

        if settings.mock {
            log::info!("mail: mock mode, messages are logged only");
            return Ok(Self::mock(from));
        }

        let builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        };
        let mut builder = builder.port(settings.smtp_port);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.expose_secret().to_string()));
        }
        log::info!("mail: delivering via {}:{}", settings.smtp_host, settings.smtp_port);

        Ok(Self {
            from,
            transport: Transport::Smtp(builder.build()),
        })
    }

    /// Logs each message instead of delivering it.
    pub fn mock(from: Mailbox) -> Self {
        Self { from, transport: Transport::Log }
    }

    /// Keeps every message for later inspection through [`sent`](Self::sent).
    /// Nothing is ever dropped, so this is for tests only.
    pub fn recording(from: Mailbox) -> Self {
        Self {
            from,
            transport: Transport::Recording(Mutex::new(Vec::new())),
        }
    }

    /// Messages captured by a recording notifier, oldest first.
    pub fn sent(&self) -> Vec<Notice> {
        match &self.transport {
            Transport::Recording(sent) => sent.lock().map(|s| s.clone()).unwrap_or_default(),
            Transport::Smtp(_) | Transport::Log => Vec::new(),
        }
    }

    fn build(&self, notice: &Notice) -> anyhow::Result<Message> {
        let to: Mailbox = notice
            .to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient {:?}: {e}", notice.to))?;
        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&notice.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(notice.body.clone())?)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()> {
        let message = self.build(notice)?;
        match &self.transport {
            Transport::Smtp(mailer) => {
                mailer.send(message).await?;
                log::info!("mail sent to {}: {}", notice.to, notice.subject);
            }
            Transport::Log => {
                log::info!("mail (mock) to {}: {}\n{}", notice.to, notice.subject, notice.body);
            }
            Transport::Recording(sent) => {
                log::debug!("mail (recorded) to {}: {}", notice.to, notice.subject);
                if let Ok(mut sent) = sent.lock() {
                    sent.push(notice.clone());
                }
            }
        }
        Ok(())
    }
}
