use crate::types::{DigestError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

/// Delivers a finished digest.
#[async_trait]
pub trait DigestMailer: Send + Sync {
    async fn send(&self, subject: &str, html: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

/// SendGrid v3 `mail/send` client.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
    to: String,
}

impl SendGridMailer {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
            to: to.into(),
        })
    }
}

#[async_trait]
impl DigestMailer for SendGridMailer {
    async fn send(&self, subject: &str, html: &str) -> Result<()> {
        let payload = MailSend {
            personalizations: vec![Personalization {
                to: vec![Address { email: &self.to }],
            }],
            from: Address { email: &self.from },
            subject,
            content: vec![Content {
                content_type: "text/html",
                value: html,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SendGrid API error {}: {}", status.as_u16(), body);
            return Err(DigestError::Email {
                status: status.as_u16(),
                body,
            });
        }

        info!("Digest email sent to {}", self.to);
        Ok(())
    }
}
