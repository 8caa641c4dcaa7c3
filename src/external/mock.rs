//! Test doubles for collaborators.

use super::Mailer;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub template_key: String,
    pub data: serde_json::Value,
}

/// Records every email; optionally reports delivery failure.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose deliveries all fail.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email(
        &self,
        to_address: &str,
        template_key: &str,
        template_data: &serde_json::Value,
    ) -> bool {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentEmail {
                to: to_address.to_string(),
                template_key: template_key.to_string(),
                data: template_data.clone(),
            });
        }
        !self.fail
    }
}
