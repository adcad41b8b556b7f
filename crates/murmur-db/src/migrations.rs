use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (comments, mentions, notifications)");
        conn.execute_batch(
            "
            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                content     TEXT NOT NULL,
                author_id   TEXT NOT NULL,
                parent_id   TEXT REFERENCES comments(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_parent
                ON comments(parent_id, created_at);

            CREATE TABLE mentions (
                id          TEXT PRIMARY KEY,
                comment_id  TEXT NOT NULL REFERENCES comments(id),
                user_id     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_mentions_comment
                ON mentions(comment_id);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                type        TEXT NOT NULL,
                mention_id  TEXT NOT NULL REFERENCES mentions(id),
                read        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            CREATE INDEX idx_notifications_mention
                ON notifications(mention_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
