//! Database row types. These map directly to SQLite rows and are kept apart
//! from the murmur-types wire models.

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MentionRow {
    pub id: String,
    pub comment_id: String,
    pub user_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub mention_id: String,
    pub read: bool,
    pub created_at: String,
}

/// A notification joined with the mention that raised it and that mention's
/// comment.
#[derive(Debug, Clone)]
pub struct NotificationDetailRow {
    pub notification: NotificationRow,
    pub mention: MentionRow,
    pub comment: CommentRow,
}

/// Rows written by one mention fanout.
#[derive(Debug, Clone, Default)]
pub struct Fanout {
    pub mentions: Vec<MentionRow>,
    pub notifications: Vec<NotificationRow>,
}
