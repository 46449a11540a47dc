//! Email dispatch collaborator.
//!
//! Registration, resend, and reset flows hand an [`EmailMessage`] to an
//! [`EmailSender`] at the flow boundary and report the result once; there is
//! no queue and no retry here. Delivery specifics (SMTP, provider API) live
//! behind the trait; the default sender for local development logs the
//! payload and returns `Ok(())`.

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

impl EmailMessage {
    /// Build the verification email payload.
    pub(crate) fn verification(to_email: &str, verify_url: &str) -> Result<Self> {
        Self::from_template(to_email, "verify_email", verify_url)
    }

    /// Build the password reset email payload.
    pub(crate) fn password_reset(to_email: &str, reset_url: &str) -> Result<Self> {
        Self::from_template(to_email, "reset_password", reset_url)
    }

    fn from_template(to_email: &str, template: &str, link: &str) -> Result<Self> {
        let payload = json!({
            "email": to_email,
            "link": link,
        });
        let payload_json =
            serde_json::to_string(&payload).context("failed to serialize email payload")?;
        Ok(Self {
            to_email: to_email.to_string(),
            template: template.to_string(),
            payload_json,
        })
    }
}

/// Email delivery abstraction used by the auth flows.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error for the caller to surface.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}
