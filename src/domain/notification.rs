//! Admin and client notifications, unique per (reference_id, type).

use super::TimeMs;
use serde::Serialize;
use uuid::Uuid;

string_enum! {
    pub enum Audience ("notification audience") {
        Admin => "admin",
        Client => "client",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub audience: Audience,
    /// Recipient for client notifications.
    pub user_id: Option<Uuid>,
    /// Specific admin recipient; `None` means every admin sees it.
    pub admin_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub reference_id: String,
    pub is_read: bool,
    pub created_at: TimeMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub audience: Audience,
    pub user_id: Option<Uuid>,
    pub admin_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub reference_id: String,
}

impl NewNotification {
    /// Notification visible to all admins.
    pub fn for_admins(
        notification_type: impl Into<String>,
        reference_id: impl ToString,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            audience: Audience::Admin,
            user_id: None,
            admin_id: None,
            title: title.into(),
            message: message.into(),
            notification_type: notification_type.into(),
            reference_id: reference_id.to_string(),
        }
    }

    pub fn for_client(
        user_id: Uuid,
        notification_type: impl Into<String>,
        reference_id: impl ToString,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            audience: Audience::Client,
            user_id: Some(user_id),
            admin_id: None,
            title: title.into(),
            message: message.into(),
            notification_type: notification_type.into(),
            reference_id: reference_id.to_string(),
        }
    }
}
