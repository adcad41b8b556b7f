use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NotificationType;

// -- JWT Claims --

/// Claims carried by identity provider tokens. `sub` is the external user id,
/// which is an opaque string rather than one of our UUIDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: Option<String>,
    pub parent_id: Option<String>,
    pub mentioned_user_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub content: String,
    pub author_id: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub mentions: Vec<MentionResponse>,
    pub replies: Vec<ReplyResponse>,
}

/// A direct reply embedded in its parent. Replies carry their mentions but
/// not their own replies; clients page deeper levels with `parentId`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub id: Uuid,
    pub content: String,
    pub author_id: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub mentions: Vec<MentionResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionResponse {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationSummary>,
}

#[derive(Debug, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentResponse>,
    pub total: u64,
    pub pages: u64,
}

// -- Notifications --

/// A notification without its embedded mention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub mention_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub mention_id: Uuid,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub mention: NotificationMention,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMention {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub comment: CommentSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: Uuid,
    pub content: String,
    pub author_id: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<NotificationResponse>,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

// -- Pagination --

/// Raw query string values. Kept as strings so bad input becomes a field
/// error instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub parent_id: Option<String>,
}

// -- User directory --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub photo_url: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<DirectoryUser>,
    pub groups: Vec<DirectoryGroup>,
}
