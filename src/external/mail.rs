//! Email delivery through an HTTP mail relay, or just the log.

use super::Mailer;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

/// Posts `{to, template, data}` to a mail relay webhook.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl WebhookMailer {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
            max_elapsed: Duration::from_secs(30),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send_email(
        &self,
        to_address: &str,
        template_key: &str,
        template_data: &serde_json::Value,
    ) -> bool {
        let payload = serde_json::json!({
            "to": to_address,
            "template": template_key,
            "data": template_data,
        });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(e.to_string()))?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(format!("relay returned {}", status)));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(format!("relay returned {}", status)));
            }
            Ok(())
        })
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(to = %to_address, template = %template_key, error = %e, "email delivery failed");
                false
            }
        }
    }
}

/// Logs emails instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(
        &self,
        to_address: &str,
        template_key: &str,
        template_data: &serde_json::Value,
    ) -> bool {
        info!(to = %to_address, template = %template_key, data = %template_data, "email (log only)");
        true
    }
}
