use anyhow::Context;
use async_trait::async_trait;

use super::Notifier;

/// Sends through a JSON email API (Resend/Postmark style endpoint).
pub struct HttpEmailNotifier {
    api_url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl HttpEmailNotifier {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            api_url,
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .context("failed to send email")?
            .error_for_status()
            .context("email API returned error")?;

        Ok(())
    }
}
