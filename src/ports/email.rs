//! Outbound email for the verification-code flow.
//!
//! Delivery goes through the external `sendEmail` tool; SMTP details stay
//! outside the process.

use crate::config::EmailConfig;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("failed to run sendEmail: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sendEmail failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait EmailPort: Send + Sync {
    async fn send_verify_code(&self, to: &str, code: &str) -> Result<(), EmailError>;
}

pub struct SendEmailCommand {
    config: EmailConfig,
}

impl SendEmailCommand {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), EmailError> {
        let output = tokio::process::Command::new("sendEmail")
            .arg("-f")
            .arg(&self.config.from)
            .arg("-t")
            .arg(to)
            .arg("-s")
            .arg(&self.config.smtp)
            .arg("-u")
            .arg(subject)
            .arg("-o")
            .arg(format!("message-content-type={}", self.config.content_type))
            .arg("-o")
            .arg("message-charset=utf-8")
            .arg("-xu")
            .arg(&self.config.username)
            .arg("-xp")
            .arg(&self.config.password)
            .arg("-m")
            .arg(body)
            .output()
            .await?;

        if output.status.success() {
            debug!(to, "verification email sent");
            Ok(())
        } else {
            Err(EmailError::Failed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

#[async_trait]
impl EmailPort for SendEmailCommand {
    async fn send_verify_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        let body = format!(
            r#"<!DOCTYPE html>
<html lang="zh">
<body style="font-family: Arial, sans-serif; text-align: center;">
  <h2>BreezeChat</h2>
  <p>您的验证码为：</p>
  <p style="font-size: 24px; letter-spacing: 4px;"><b>{code}</b></p>
  <p>验证码10分钟内有效，请勿泄露给他人。</p>
</body>
</html>"#
        );
        self.send(to, "BreezeChat验证码", &body).await
    }
}
