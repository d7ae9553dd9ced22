use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

use super::sink::{AlertSink, SinkError};
use crate::config::{WebhookConfig, WebhookKind};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);
const DOWN_COLOR: u32 = 0xFF0000;
const UP_COLOR: u32 = 0x00FF00;

/// Webhook sink rendering a chat-platform specific JSON body
pub struct WebhookSink {
    kind: WebhookKind,
    url: String,
    name: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;

        Ok(Self {
            kind: config.kind,
            url: config.url.clone(),
            name: format!("{}:{}", config.kind, config.url),
            client,
        })
    }

    /// Render the request body for this sink's platform
    fn format_payload(&self, title: &str, message: &str) -> serde_json::Value {
        let timestamp = Utc::now().to_rfc3339();

        match self.kind {
            WebhookKind::Discord => json!({
                "embeds": [{
                    "title": title,
                    "description": message,
                    "color": if title.contains("DOWN") { DOWN_COLOR } else { UP_COLOR },
                    "timestamp": timestamp,
                }]
            }),
            WebhookKind::Slack => json!({
                "text": title,
                "blocks": [
                    { "type": "header", "text": { "type": "plain_text", "text": title } },
                    { "type": "section", "text": { "type": "mrkdwn", "text": message.replace("**", "*") } }
                ]
            }),
            WebhookKind::Generic => json!({
                "title": title,
                "message": message,
                "timestamp": timestamp,
            }),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, title: &str, message: &str) -> Result<(), SinkError> {
        let payload = self.format_payload(title, message);
        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
