use crate::Database;
use crate::models::{CommentRow, Fanout, MentionRow, NotificationDetailRow, NotificationRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use murmur_types::models::NotificationType;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::debug;
use uuid::Uuid;

const COMMENT_COLUMNS: &str = "id, content, author_id, parent_id, created_at";

/// RFC 3339 with fixed millisecond precision, so text order is time order.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    // -- Comments --

    /// Insert a comment and fan out one mention plus one notification per
    /// mentioned user, all in one transaction. Returns `None` if `parent_id`
    /// names no comment.
    pub fn create_comment(
        &self,
        author_id: &str,
        content: &str,
        parent_id: Option<&str>,
        mentioned_user_ids: &[String],
    ) -> Result<Option<(CommentRow, Fanout)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(parent) = parent_id {
                if query_comment(&tx, parent)?.is_none() {
                    return Ok(None);
                }
            }

            let comment = CommentRow {
                id: Uuid::new_v4().to_string(),
                content: content.to_string(),
                author_id: author_id.to_string(),
                parent_id: parent_id.map(str::to_string),
                created_at: now_timestamp(),
            };

            tx.execute(
                "INSERT INTO comments (id, content, author_id, parent_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![comment.id, comment.content, comment.author_id, comment.parent_id, comment.created_at],
            )?;

            let fanout = insert_fanout(&tx, &comment.id, mentioned_user_ids)?;
            tx.commit()?;

            Ok(Some((comment, fanout)))
        })
    }

    /// Replace a comment's content and append a mention fanout for the given
    /// users. Existing mentions are left alone. Returns `None` if the comment
    /// does not exist.
    pub fn update_comment(
        &self,
        id: &str,
        content: &str,
        mentioned_user_ids: &[String],
    ) -> Result<Option<(CommentRow, Fanout)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute("UPDATE comments SET content = ?1 WHERE id = ?2", params![content, id])?;
            if changed == 0 {
                return Ok(None);
            }

            let fanout = insert_fanout(&tx, id, mentioned_user_ids)?;
            let comment = query_comment(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Comment {} vanished during update", id))?;
            tx.commit()?;

            Ok(Some((comment, fanout)))
        })
    }

    /// Delete a comment together with its reply subtree. Notifications go
    /// first, then mentions, then the comments themselves. Returns the
    /// number of mention rows removed, or `None` if the comment does not exist.
    pub fn delete_comment(&self, id: &str) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "WITH RECURSIVE subtree(id) AS (
                         SELECT id FROM comments WHERE id = ?1
                         UNION ALL
                         SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
                     )
                     SELECT id FROM subtree",
                )?;
                let rows = stmt
                    .query_map([id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            if ids.is_empty() {
                return Ok(None);
            }

            let list = placeholders(1, ids.len());
            let notifications = tx.execute(
                &format!(
                    "DELETE FROM notifications WHERE mention_id IN
                         (SELECT id FROM mentions WHERE comment_id IN ({}))",
                    list
                ),
                params_from_iter(ids.iter()),
            )?;
            let mentions = tx.execute(
                &format!("DELETE FROM mentions WHERE comment_id IN ({})", list),
                params_from_iter(ids.iter()),
            )?;
            tx.execute(
                &format!("DELETE FROM comments WHERE id IN ({})", list),
                params_from_iter(ids.iter()),
            )?;
            tx.commit()?;

            debug!(
                comment_id = id,
                comments = ids.len(),
                mentions,
                notifications,
                "Deleted comment subtree"
            );
            Ok(Some(mentions))
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// One page of comments under `parent_id` (top level when `None`),
    /// newest first.
    pub fn list_comments(&self, parent_id: Option<&str>, limit: u32, offset: u64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM comments
                 WHERE parent_id IS ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
                COMMENT_COLUMNS
            ))?;

            let rows = stmt
                .query_map(params![parent_id, limit, offset as i64], |row| comment_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_comments(&self, parent_id: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM comments WHERE parent_id IS ?1", [parent_id], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    /// Batch-fetch the direct replies of a set of comments, oldest first.
    pub fn get_replies_for_comments(&self, parent_ids: &[String]) -> Result<Vec<CommentRow>> {
        if parent_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM comments WHERE parent_id IN ({}) ORDER BY created_at ASC, rowid ASC",
                COMMENT_COLUMNS,
                placeholders(1, parent_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(parent_ids.iter()), |row| comment_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Mentions --

    /// Batch-fetch mentions for a set of comment IDs, in insertion order.
    pub fn get_mentions_for_comments(&self, comment_ids: &[String]) -> Result<Vec<MentionRow>> {
        if comment_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, comment_id, user_id, created_at FROM mentions
                 WHERE comment_id IN ({})
                 ORDER BY created_at ASC, rowid ASC",
                placeholders(1, comment_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(comment_ids.iter()), |row| mention_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Notifications --

    pub fn get_notifications_for_mentions(&self, mention_ids: &[String]) -> Result<Vec<NotificationRow>> {
        if mention_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, user_id, type, mention_id, read, created_at FROM notifications
                 WHERE mention_id IN ({})",
                placeholders(1, mention_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(mention_ids.iter()), |row| notification_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// One page of a user's notifications, newest first, each joined with its
    /// mention and the mention's comment.
    pub fn list_notifications(&self, user_id: &str, limit: u32, offset: u64) -> Result<Vec<NotificationDetailRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT n.id, n.user_id, n.type, n.mention_id, n.read, n.created_at,
                        m.id, m.comment_id, m.user_id, m.created_at,
                        c.id, c.content, c.author_id, c.parent_id, c.created_at
                 FROM notifications n
                 JOIN mentions m ON n.mention_id = m.id
                 JOIN comments c ON m.comment_id = c.id
                 WHERE n.user_id = ?1
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt
                .query_map(params![user_id, limit, offset as i64], |row| {
                    Ok(NotificationDetailRow {
                        notification: notification_at(row, 0)?,
                        mention: mention_at(row, 6)?,
                        comment: comment_at(row, 10)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn count_notifications(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM notifications WHERE user_id = ?1", [user_id], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    /// Mark every unread notification of `user_id` as read. Returns how many
    /// rows changed.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }

    /// Set the read flag of one notification owned by `user_id`. Returns
    /// `None` when no such notification belongs to that user.
    pub fn set_notification_read(&self, id: &str, user_id: &str, read: bool) -> Result<Option<NotificationDetailRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = ?1 WHERE id = ?2 AND user_id = ?3",
                params![read, id, user_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            conn.query_row(
                "SELECT n.id, n.user_id, n.type, n.mention_id, n.read, n.created_at,
                        m.id, m.comment_id, m.user_id, m.created_at,
                        c.id, c.content, c.author_id, c.parent_id, c.created_at
                 FROM notifications n
                 JOIN mentions m ON n.mention_id = m.id
                 JOIN comments c ON m.comment_id = c.id
                 WHERE n.id = ?1",
                [id],
                |row| {
                    Ok(NotificationDetailRow {
                        notification: notification_at(row, 0)?,
                        mention: mention_at(row, 6)?,
                        comment: comment_at(row, 10)?,
                    })
                },
            )
            .optional()
        })
    }
}

/// Write one mention per user id and one MENTION notification pointing at
/// that same mention. Runs inside the caller's transaction.
fn insert_fanout(conn: &Connection, comment_id: &str, user_ids: &[String]) -> Result<Fanout> {
    let mut fanout = Fanout::default();
    if user_ids.is_empty() {
        return Ok(fanout);
    }

    let created_at = now_timestamp();
    let mut insert_mention =
        conn.prepare("INSERT INTO mentions (id, comment_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)")?;
    let mut insert_notification = conn.prepare(
        "INSERT INTO notifications (id, user_id, type, mention_id, read, created_at) VALUES (?1, ?2, ?3, ?4, 0, ?5)",
    )?;

    for user_id in user_ids {
        let mention = MentionRow {
            id: Uuid::new_v4().to_string(),
            comment_id: comment_id.to_string(),
            user_id: user_id.clone(),
            created_at: created_at.clone(),
        };
        insert_mention.execute(params![mention.id, mention.comment_id, mention.user_id, mention.created_at])?;

        let notification = NotificationRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            kind: NotificationType::Mention.as_str().to_string(),
            mention_id: mention.id.clone(),
            read: false,
            created_at: created_at.clone(),
        };
        insert_notification.execute(params![
            notification.id,
            notification.user_id,
            notification.kind,
            notification.mention_id,
            notification.created_at
        ])?;

        fanout.mentions.push(mention);
        fanout.notifications.push(notification);
    }

    debug!(comment_id, mentions = fanout.mentions.len(), "Mention fanout written");
    Ok(fanout)
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    conn.query_row(
        &format!("SELECT {} FROM comments WHERE id = ?1", COMMENT_COLUMNS),
        [id],
        |row| comment_at(row, 0),
    )
    .optional()
}

fn comment_at(row: &Row, base: usize) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(base)?,
        content: row.get(base + 1)?,
        author_id: row.get(base + 2)?,
        parent_id: row.get(base + 3)?,
        created_at: row.get(base + 4)?,
    })
}

fn mention_at(row: &Row, base: usize) -> rusqlite::Result<MentionRow> {
    Ok(MentionRow {
        id: row.get(base)?,
        comment_id: row.get(base + 1)?,
        user_id: row.get(base + 2)?,
        created_at: row.get(base + 3)?,
    })
}

fn notification_at(row: &Row, base: usize) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(base)?,
        user_id: row.get(base + 1)?,
        kind: row.get(base + 2)?,
        mention_id: row.get(base + 3)?,
        read: row.get(base + 4)?,
        created_at: row.get(base + 5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
