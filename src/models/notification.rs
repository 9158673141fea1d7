use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Closed set of notification kinds the newsroom emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewsPublished,
    NewsUpdated,
    CommentNew,
    CommentReply,
    DeadlineApproaching,
    ApprovalRequest,
    ApprovalDecision,
    System,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::NewsPublished,
        NotificationType::NewsUpdated,
        NotificationType::CommentNew,
        NotificationType::CommentReply,
        NotificationType::DeadlineApproaching,
        NotificationType::ApprovalRequest,
        NotificationType::ApprovalDecision,
        NotificationType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewsPublished => "news_published",
            NotificationType::NewsUpdated => "news_updated",
            NotificationType::CommentNew => "comment_new",
            NotificationType::CommentReply => "comment_reply",
            NotificationType::DeadlineApproaching => "deadline_approaching",
            NotificationType::ApprovalRequest => "approval_request",
            NotificationType::ApprovalDecision => "approval_decision",
            NotificationType::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub r#type: NotificationType, // 'type' is a reserved keyword
    pub title: String,
    pub message: Option<String>,
    /// Type-specific payload (referenced article id/title, commenting
    /// user, ...). Open schema, keys depend on `type`.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Null means unread.
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Filters applied to page loads and mirrored onto the realtime scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFilter {
    /// Restrict to these kinds. `None` means all kinds.
    pub types: Option<Vec<NotificationType>>,
    /// `Some(false)` = unread only, `Some(true)` = read only.
    pub read: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// A row-level change delivered by the realtime channel, normalized from
/// the wire framing into the three ingest paths the store understands.
#[derive(Debug, Clone)]
pub enum RealtimeChange {
    Insert(Notification),
    Update(Notification),
    Delete { id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serde_roundtrip() {
        let json = serde_json::to_string(&NotificationType::ApprovalRequest).unwrap();
        assert_eq!(json, r#""approval_request""#);
        let back: NotificationType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NotificationType::ApprovalRequest);
    }

    #[test]
    fn test_notification_deserializes_without_data() {
        let row = serde_json::json!({
            "id": "7c0e9f7a-3c4e-4b36-9a3b-2f8e1d6a5c40",
            "user_id": "2d1c8e5b-6f7a-4d2e-8b9c-0a1b2c3d4e5f",
            "type": "comment_new",
            "title": "New comment",
            "message": null,
            "read_at": null,
            "created_at": "2026-03-01T12:00:00Z",
            "updated_at": "2026-03-01T12:00:00Z"
        });
        let n: Notification = serde_json::from_value(row).unwrap();
        assert!(n.is_unread());
        assert!(n.data.is_empty());
    }
}
