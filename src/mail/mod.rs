//! Outgoing notifications over SMTP with retries and an `email_logs` audit trail.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::model::entity::{EmailLinks, EmailLog, EmailLogCreate, UserEntity};
use crate::model::{DatabaseError, ModelManager};

pub mod templates;

use templates::{ModuleReviewed, ModuleSubmitted, Rendered, SubmissionReviewed};

pub type MailResult<T> = std::result::Result<T, MailError>;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("smtp error: {0}")]
    SmtpError(#[from] lettre::transport::smtp::Error),
    #[error("message error: {0}")]
    MessageError(#[from] lettre::error::Error),
    #[error("address error: {0}")]
    AddressError(#[from] lettre::address::AddressError),
    #[error("server rejected message: {0}")]
    Rejected(String),
    #[error(transparent)]
    DatabaseError(#[from] DatabaseError),
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> MailResult<()>;
}

/// STARTTLS relay with username/password authentication.
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpSender {
    pub fn new(
        host: &str,
        port: u16,
        (username, password): (&str, &str),
        from_email: &str,
        from_name: &str,
    ) -> MailResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(30)))
            .build();
        let from = Mailbox::new(Some(from_name.to_string()), from_email.parse()?);
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailSender for SmtpSender {
    async fn send(&self, email: &OutgoingEmail) -> MailResult<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))?;

        let response = self.transport.send(message).await?;
        if !response.is_positive() {
            return Err(MailError::Rejected(response.code().to_string()));
        }
        Ok(())
    }
}

/// Tries `attempts` times, sleeping `base_delay * 2^n` after the n-th failure.
/// Returns the number of attempts made on success.
pub async fn deliver_with_retry(
    sender: &dyn MailSender,
    email: &OutgoingEmail,
    attempts: u32,
    base_delay: Duration,
) -> Result<u32, (u32, MailError)> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match sender.send(email).await {
            Ok(()) => return Ok(attempt + 1),
            Err(e) if attempt + 1 >= attempts => return Err((attempt + 1, e)),
            Err(e) => {
                tracing::warn!(
                    "email to {} failed (attempt {}/{}): {}",
                    email.to,
                    attempt + 1,
                    attempts,
                    e
                );
                tokio::time::sleep(base_delay.saturating_mul(2u32.saturating_pow(attempt))).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Skipped,
    Sent,
    Failed,
}

pub enum Notification {
    SubmissionReviewed {
        to: String,
        context: SubmissionReviewed,
        links: EmailLinks,
    },
    ModuleApproved {
        to: String,
        context: ModuleReviewed,
        links: EmailLinks,
    },
    ModuleRejected {
        to: String,
        context: ModuleReviewed,
        links: EmailLinks,
    },
    /// Goes to every configured admin address.
    ModuleSubmitted {
        context: ModuleSubmitted,
        links: EmailLinks,
    },
}

#[derive(Clone)]
pub struct EmailService {
    sender: Option<Arc<dyn MailSender>>,
    admin_emails: Vec<String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("enabled", &self.is_enabled())
            .field("admin_emails", &self.admin_emails)
            .finish()
    }
}

impl EmailService {
    /// A disabled service when notifications are off or SMTP credentials are missing.
    pub fn from_config(email: &crate::config::Email) -> MailResult<Self> {
        let sender: Option<Arc<dyn MailSender>> = match (email.enabled(), email.credentials()) {
            (true, Some(credentials)) => Some(Arc::new(SmtpSender::new(
                email.smtp_host(),
                email.smtp_port(),
                credentials,
                email.from_email(),
                email.from_name(),
            )?)),
            (true, None) => {
                tracing::warn!("email enabled but SMTP credentials are missing; notifications are off");
                None
            }
            (false, _) => None,
        };

        Ok(Self {
            sender,
            admin_emails: email.admin_emails().to_vec(),
            retry_attempts: email.retry_attempts(),
            retry_delay: email.retry_delay(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            sender: None,
            admin_emails: Vec::new(),
            retry_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn with_sender(
        sender: Arc<dyn MailSender>,
        admin_emails: Vec<String>,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            sender: Some(sender),
            admin_emails,
            retry_attempts,
            retry_delay,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Logs, sends with retries and records the outcome on the log row.
    #[tracing::instrument(skip(self, mm, rendered, context, links), fields(subject = %rendered.subject))]
    pub async fn send(
        &self,
        mm: &ModelManager,
        to: &str,
        template_name: &str,
        rendered: &Rendered,
        context: serde_json::Value,
        links: &EmailLinks,
    ) -> MailResult<Delivery> {
        let Some(sender) = &self.sender else {
            tracing::info!("email disabled, not sending '{}' to {}", rendered.subject, to);
            return Ok(Delivery::Skipped);
        };

        let log = EmailLog::create_pending(
            mm,
            EmailLogCreate {
                recipient_email: to,
                email_type: template_name,
                subject: &rendered.subject,
                template_name,
                context_data: context,
                links,
            },
        )
        .await?;

        let email = OutgoingEmail {
            to: to.to_string(),
            subject: rendered.subject.clone(),
            html: rendered.html.clone(),
            text: rendered.text.clone(),
        };

        match deliver_with_retry(sender.as_ref(), &email, self.retry_attempts, self.retry_delay).await
        {
            Ok(attempts) => {
                EmailLog::mark_sent(mm, log.id()).await?;
                tracing::info!("sent '{}' to {} after {} attempt(s)", email.subject, to, attempts);
                Ok(Delivery::Sent)
            }
            Err((attempts, e)) => {
                tracing::error!("giving up on '{}' to {} after {} attempts: {}", email.subject, to, attempts, e);
                EmailLog::mark_failed(mm, log.id(), &e.to_string()).await?;
                Ok(Delivery::Failed)
            }
        }
    }

    async fn deliver(&self, mm: &ModelManager, notification: Notification) -> MailResult<()> {
        match notification {
            Notification::SubmissionReviewed { to, context, links } => {
                let rendered = templates::submission_reviewed(&context);
                let ctx = serde_json::to_value(&context).map_err(DatabaseError::from)?;
                self.send(mm, &to, templates::SUBMISSION_REVIEWED, &rendered, ctx, &links)
                    .await?;
            }
            Notification::ModuleApproved { to, context, links } => {
                let rendered = templates::module_approved(&context);
                let ctx = serde_json::to_value(&context).map_err(DatabaseError::from)?;
                self.send(mm, &to, templates::MODULE_APPROVED, &rendered, ctx, &links)
                    .await?;
            }
            Notification::ModuleRejected { to, context, links } => {
                let rendered = templates::module_rejected(&context);
                let ctx = serde_json::to_value(&context).map_err(DatabaseError::from)?;
                self.send(mm, &to, templates::MODULE_REJECTED, &rendered, ctx, &links)
                    .await?;
            }
            Notification::ModuleSubmitted { context, links } => {
                let recipients = if self.admin_emails.is_empty() {
                    UserEntity::list_staff_emails(mm).await?
                } else {
                    self.admin_emails.clone()
                };
                if recipients.is_empty() {
                    tracing::warn!("no admin addresses to notify about a module submission");
                    return Ok(());
                }

                let rendered = templates::module_submitted(&context);
                let ctx = serde_json::to_value(&context).map_err(DatabaseError::from)?;
                for to in recipients {
                    self.send(mm, &to, templates::MODULE_SUBMITTED, &rendered, ctx.clone(), &links)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Sends in the background. Failures are logged and never reach the caller.
    pub fn dispatch(&self, mm: &ModelManager, notification: Notification) {
        if !self.is_enabled() {
            tracing::debug!("email disabled, dropping notification");
            return;
        }

        let service = self.clone();
        let mm = mm.clone();
        tokio::spawn(async move {
            if let Err(e) = service.deliver(&mm, notification).await {
                tracing::error!("notification failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct FlakySender {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MailSender for FlakySender {
        async fn send(&self, _email: &OutgoingEmail) -> MailResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(MailError::Rejected(String::from("451")))
            } else {
                Ok(())
            }
        }
    }

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            to: "student@example.com".into(),
            subject: "hi".into(),
            html: "<p>hi</p>".into(),
            text: "hi".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let sender = FlakySender {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let attempts = deliver_with_retry(&sender, &email(), 3, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let sender = FlakySender {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let (attempts, err) = deliver_with_retry(&sender, &email(), 3, Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(attempts, 3);
        assert!(matches!(err, MailError::Rejected(_)));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles() {
        let sender = FlakySender {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let started = tokio::time::Instant::now();
        deliver_with_retry(&sender, &email(), 3, Duration::from_secs(2))
            .await
            .unwrap();
        // 2s after the first failure, 4s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn disabled_service_sends_nothing() {
        assert!(!EmailService::disabled().is_enabled());
    }
}
