//! Row → wire conversions and comment tree assembly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use murmur_db::Database;
use murmur_db::models::{CommentRow, Fanout, MentionRow, NotificationDetailRow, NotificationRow};
use murmur_types::api::{
    CommentResponse, CommentSummary, MentionResponse, NotificationMention, NotificationResponse,
    NotificationSummary, ReplyResponse,
};
use murmur_types::models::NotificationType;

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn comment_summary(row: &CommentRow) -> CommentSummary {
    CommentSummary {
        id: parse_uuid(&row.id, "comment id"),
        content: row.content.clone(),
        author_id: row.author_id.clone(),
        parent_id: row.parent_id.as_deref().map(|p| parse_uuid(p, "parent id")),
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn mention_response(row: &MentionRow, notification: Option<NotificationSummary>) -> MentionResponse {
    MentionResponse {
        id: parse_uuid(&row.id, "mention id"),
        comment_id: parse_uuid(&row.comment_id, "mention comment_id"),
        user_id: row.user_id.clone(),
        created_at: parse_timestamp(&row.created_at),
        notification,
    }
}

pub fn notification_summary(row: &NotificationRow) -> NotificationSummary {
    NotificationSummary {
        id: parse_uuid(&row.id, "notification id"),
        user_id: row.user_id.clone(),
        kind: row.kind.parse().unwrap_or_else(|e| {
            warn!("Notification '{}': {}", row.id, e);
            NotificationType::Mention
        }),
        mention_id: parse_uuid(&row.mention_id, "notification mention_id"),
        read: row.read,
        created_at: parse_timestamp(&row.created_at),
    }
}

pub fn notification_response(row: &NotificationDetailRow) -> NotificationResponse {
    let n = notification_summary(&row.notification);
    NotificationResponse {
        id: n.id,
        user_id: n.user_id,
        kind: n.kind,
        mention_id: n.mention_id,
        read: n.read,
        created_at: n.created_at,
        mention: NotificationMention {
            id: parse_uuid(&row.mention.id, "mention id"),
            comment_id: parse_uuid(&row.mention.comment_id, "mention comment_id"),
            user_id: row.mention.user_id.clone(),
            created_at: parse_timestamp(&row.mention.created_at),
            comment: comment_summary(&row.comment),
        },
    }
}

fn comment_response(row: &CommentRow, mentions: Vec<MentionResponse>, replies: Vec<ReplyResponse>) -> CommentResponse {
    let summary = comment_summary(row);
    CommentResponse {
        id: summary.id,
        content: summary.content,
        author_id: summary.author_id,
        parent_id: summary.parent_id,
        created_at: summary.created_at,
        mentions,
        replies,
    }
}

/// A freshly created comment: it has no replies yet, and its mentions are
/// exactly the ones just written.
pub fn created_comment(row: &CommentRow, fanout: &Fanout) -> CommentResponse {
    let mentions = fanout.mentions.iter().map(|m| mention_response(m, None)).collect();
    comment_response(row, mentions, vec![])
}

/// Attach mentions and direct replies (with their mentions) to each comment.
/// With `with_notifications`, top-level mentions also carry their
/// notification. Blocking; call from `with_db`.
pub fn load_comments(db: &Database, rows: Vec<CommentRow>, with_notifications: bool) -> anyhow::Result<Vec<CommentResponse>> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let replies = db.get_replies_for_comments(&ids)?;

    let mut all_ids = ids;
    all_ids.extend(replies.iter().map(|r| r.id.clone()));
    let mentions = db.get_mentions_for_comments(&all_ids)?;

    let mut notifications: HashMap<String, NotificationSummary> = HashMap::new();
    if with_notifications {
        let top_level: Vec<String> = mentions
            .iter()
            .filter(|m| rows.iter().any(|r| r.id == m.comment_id))
            .map(|m| m.id.clone())
            .collect();
        for n in db.get_notifications_for_mentions(&top_level)? {
            notifications.insert(n.mention_id.clone(), notification_summary(&n));
        }
    }

    let mut mentions_by_comment: HashMap<String, Vec<MentionResponse>> = HashMap::new();
    for m in &mentions {
        let notification = notifications.remove(&m.id);
        mentions_by_comment
            .entry(m.comment_id.clone())
            .or_default()
            .push(mention_response(m, notification));
    }

    let mut replies_by_parent: HashMap<String, Vec<ReplyResponse>> = HashMap::new();
    for reply in &replies {
        let Some(parent) = reply.parent_id.clone() else { continue };
        let summary = comment_summary(reply);
        replies_by_parent.entry(parent).or_default().push(ReplyResponse {
            id: summary.id,
            content: summary.content,
            author_id: summary.author_id,
            parent_id: summary.parent_id,
            created_at: summary.created_at,
            mentions: mentions_by_comment.remove(&reply.id).unwrap_or_default(),
        });
    }

    Ok(rows
        .iter()
        .map(|row| {
            comment_response(
                row,
                mentions_by_comment.remove(&row.id).unwrap_or_default(),
                replies_by_parent.remove(&row.id).unwrap_or_default(),
            )
        })
        .collect())
}
