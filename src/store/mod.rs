use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use turso::{Builder, Connection, Database, Row};

pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize)]
pub struct Author {
    pub id: i64,
    pub title: String,
    pub photo: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: i64,
    pub title: String,
    pub photo: String,
}

/// Chat row with archive stats, for the chat list surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: i64,
    pub title: String,
    pub photo: String,
    pub message_count: i64,
    pub last_message_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub remote_id: i64,
    pub kind: String,
    pub chat_id: i64,
    pub author_id: i64,
    pub text: String,
    pub attachments: String,
    pub date: DateTime<Utc>,
    pub reply_to_id: Option<i64>,
    pub forwards: String,
}

/// Message joined with its author, for display surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub remote_id: i64,
    pub kind: String,
    pub chat_id: i64,
    pub author_id: i64,
    pub author_title: String,
    pub author_photo: String,
    pub text: String,
    pub attachments: String,
    pub date: DateTime<Utc>,
    pub reply_to_id: Option<i64>,
    pub forwards: String,
}

pub struct NewMessageParams {
    pub remote_id: i64,
    pub kind: String,
    pub chat_id: i64,
    pub author_id: i64,
    pub text: String,
    pub attachments: String,
    pub date: DateTime<Utc>,
    pub reply_to_id: Option<i64>,
    pub forwards: String,
}

impl Store {
    pub async fn open(store_dir: &str) -> Result<Self> {
        std::fs::create_dir_all(store_dir)?;
        let db_path = Path::new(store_dir).join("vklog.db");
        let db_path_str = db_path.to_string_lossy();
        let db: Database = Builder::new_local(&db_path_str)
            .build()
            .await
            .context("Failed to open database")?;
        let conn = db.connect().context("Failed to connect to database")?;

        // PRAGMAs that set values return the new value, so use query and ignore results
        let _ = conn.query("PRAGMA journal_mode=WAL", ()).await;
        let _ = conn.query("PRAGMA busy_timeout=5000", ()).await;
        let _ = conn.query("PRAGMA foreign_keys=ON", ()).await;

        let store = Store { conn };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        // Create tables one at a time (turso execute doesn't support multiple statements)
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS authors (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL DEFAULT '',
                    photo TEXT NOT NULL DEFAULT ''
                )",
                (),
            )
            .await
            .context("Failed to create authors table")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS chats (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL DEFAULT '',
                    photo TEXT NOT NULL DEFAULT ''
                )",
                (),
            )
            .await
            .context("Failed to create chats table")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY,
                    remote_id INTEGER NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'n',
                    chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
                    text TEXT NOT NULL DEFAULT '',
                    attachments TEXT NOT NULL DEFAULT '[]',
                    date TEXT NOT NULL,
                    reply_to_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
                    forwards TEXT NOT NULL DEFAULT '[]',
                    UNIQUE (remote_id, kind)
                )",
                (),
            )
            .await
            .context("Failed to create messages table")?;

        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_messages_chat_date ON messages(chat_id, date)",
                (),
            )
            .await?;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date)",
                (),
            )
            .await?;

        Ok(())
    }

    // --- Authors ---

    pub async fn get_author(&self, id: i64) -> Result<Option<Author>> {
        let mut rows = self
            .conn
            .query("SELECT id, title, photo FROM authors WHERE id = ?1", [id])
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_author(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Insert a new author row. The resolver guarantees the id is unseen;
    /// existing rows are never overwritten.
    pub async fn insert_author(&self, id: i64, title: &str, photo: &str) -> Result<Author> {
        self.conn
            .execute(
                "INSERT INTO authors (id, title, photo) VALUES (?1, ?2, ?3)",
                (id, title, photo),
            )
            .await?;
        Ok(Author {
            id,
            title: title.to_string(),
            photo: photo.to_string(),
        })
    }

    // --- Chats ---

    pub async fn get_chat(&self, id: i64) -> Result<Option<Chat>> {
        let mut rows = self
            .conn
            .query("SELECT id, title, photo FROM chats WHERE id = ?1", [id])
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_chat(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn insert_chat(&self, id: i64, title: &str, photo: &str) -> Result<Chat> {
        self.conn
            .execute(
                "INSERT INTO chats (id, title, photo) VALUES (?1, ?2, ?3)",
                (id, title, photo),
            )
            .await?;
        Ok(Chat {
            id,
            title: title.to_string(),
            photo: photo.to_string(),
        })
    }

    /// List chats with message counts, optionally filtered by a title
    /// substring, most recently active first.
    pub async fn list_chats(&self, query: Option<&str>) -> Result<Vec<ChatSummary>> {
        let mut chats = Vec::new();

        if let Some(q) = query {
            let pattern = format!("%{}%", q);
            let mut rows = self
                .conn
                .query(
                    "SELECT id, title, photo FROM chats WHERE title LIKE ?1 ORDER BY id",
                    [pattern.as_str()],
                )
                .await?;
            while let Some(row) = rows.next().await? {
                chats.push(row_to_chat(&row)?);
            }
        } else {
            let mut rows = self
                .conn
                .query("SELECT id, title, photo FROM chats ORDER BY id", ())
                .await?;
            while let Some(row) = rows.next().await? {
                chats.push(row_to_chat(&row)?);
            }
        }

        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let mut rows = self
                .conn
                .query(
                    "SELECT COUNT(*), MAX(date) FROM messages WHERE chat_id = ?1",
                    [chat.id],
                )
                .await?;
            let (message_count, last) = match rows.next().await? {
                Some(row) => (row.get::<i64>(0)?, row.get::<Option<String>>(1)?),
                None => (0, None),
            };
            summaries.push(ChatSummary {
                id: chat.id,
                title: chat.title,
                photo: chat.photo,
                message_count,
                last_message_ts: last.map(|s| parse_ts(&s)),
            });
        }
        // Most recently active first; never-active chats sink to the end.
        summaries.sort_by(|a, b| b.last_message_ts.cmp(&a.last_message_ts));
        Ok(summaries)
    }

    // --- Messages ---

    /// Look up a message by its compound remote key. This is the
    /// importer's idempotency probe.
    pub async fn get_message_by_remote(
        &self,
        remote_id: i64,
        kind: &str,
    ) -> Result<Option<StoredMessage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, remote_id, kind, chat_id, author_id, text, attachments, date, reply_to_id, forwards
                 FROM messages WHERE remote_id = ?1 AND kind = ?2",
                (remote_id, kind),
            )
            .await?;
        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_message(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Insert a message row. The caller has already checked the
    /// (remote_id, kind) key is absent; the UNIQUE constraint backs that up.
    pub async fn insert_message(&self, p: NewMessageParams) -> Result<StoredMessage> {
        let date_str = p.date.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO messages (remote_id, kind, chat_id, author_id, text, attachments, date, reply_to_id, forwards)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                (
                    p.remote_id,
                    p.kind.as_str(),
                    p.chat_id,
                    p.author_id,
                    p.text.as_str(),
                    p.attachments.as_str(),
                    date_str.as_str(),
                    p.reply_to_id,
                    p.forwards.as_str(),
                ),
            )
            .await?;

        // Read the row back through its unique key to learn the local id.
        self.get_message_by_remote(p.remote_id, &p.kind)
            .await?
            .with_context(|| format!("Message {} vanished after insert", p.remote_id))
    }

    /// Count messages in a chat, optionally restricted to those whose text
    /// or author title contains the search phrase.
    pub async fn count_messages(&self, chat_id: i64, search: Option<&str>) -> Result<i64> {
        let mut rows = if let Some(q) = search {
            let pattern = format!("%{}%", q);
            self.conn
                .query(
                    "SELECT COUNT(*) FROM messages m
                     JOIN authors a ON a.id = m.author_id
                     WHERE m.chat_id = ?1 AND (m.text LIKE ?2 OR a.title LIKE ?2)",
                    (chat_id, pattern.as_str()),
                )
                .await?
        } else {
            self.conn
                .query(
                    "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
                    [chat_id],
                )
                .await?
        };
        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?),
            None => Ok(0),
        }
    }

    /// Page of messages for a chat, newest first, joined with author info.
    pub async fn list_message_views(
        &self,
        chat_id: i64,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageView>> {
        use turso::Value;

        let mut conditions = vec!["m.chat_id = ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Integer(chat_id)];
        let mut param_idx = 2;

        if let Some(q) = search {
            conditions.push(format!(
                "(m.text LIKE ?{idx} OR a.title LIKE ?{idx})",
                idx = param_idx
            ));
            params.push(Value::Text(format!("%{}%", q)));
            param_idx += 1;
        }

        let sql = format!(
            "SELECT m.id, m.remote_id, m.kind, m.chat_id, m.author_id, a.title, a.photo,
                    m.text, m.attachments, m.date, m.reply_to_id, m.forwards
             FROM messages m
             JOIN authors a ON a.id = m.author_id
             WHERE {} ORDER BY m.date DESC, m.id DESC LIMIT ?{} OFFSET ?{}",
            conditions.join(" AND "),
            param_idx,
            param_idx + 1
        );
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));

        let mut rows = self
            .conn
            .query(&sql, turso::params_from_iter(params))
            .await?;

        let mut views = Vec::new();
        while let Some(row) = rows.next().await? {
            views.push(row_to_view(&row)?);
        }
        Ok(views)
    }

    // --- Maintenance ---

    pub async fn clear_messages(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM messages", ()).await?)
    }

    pub async fn clear_chats(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM chats", ()).await?)
    }

    pub async fn clear_authors(&self) -> Result<u64> {
        Ok(self.conn.execute("DELETE FROM authors", ()).await?)
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_author(row: &Row) -> Result<Author> {
    Ok(Author {
        id: row.get(0)?,
        title: row.get(1)?,
        photo: row.get(2)?,
    })
}

fn row_to_chat(row: &Row) -> Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        title: row.get(1)?,
        photo: row.get(2)?,
    })
}

fn row_to_message(row: &Row) -> Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        kind: row.get(2)?,
        chat_id: row.get(3)?,
        author_id: row.get(4)?,
        text: row.get(5)?,
        attachments: row.get(6)?,
        date: row.get::<String>(7).map(|s| parse_ts(&s))?,
        reply_to_id: row.get::<Option<i64>>(8)?,
        forwards: row.get(9)?,
    })
}

fn row_to_view(row: &Row) -> Result<MessageView> {
    Ok(MessageView {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        kind: row.get(2)?,
        chat_id: row.get(3)?,
        author_id: row.get(4)?,
        author_title: row.get(5)?,
        author_photo: row.get(6)?,
        text: row.get(7)?,
        attachments: row.get(8)?,
        date: row.get::<String>(9).map(|s| parse_ts(&s))?,
        reply_to_id: row.get::<Option<i64>>(10)?,
        forwards: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    fn msg(remote_id: i64, chat_id: i64, author_id: i64, secs: i64) -> NewMessageParams {
        NewMessageParams {
            remote_id,
            kind: "n".to_string(),
            chat_id,
            author_id,
            text: format!("message {}", remote_id),
            attachments: "[]".to_string(),
            date: DateTime::from_timestamp(secs, 0).unwrap(),
            reply_to_id: None,
            forwards: "[]".to_string(),
        }
    }

    #[tokio::test]
    async fn test_message_roundtrip_by_remote_key() {
        let (_dir, store) = temp_store().await;
        store.insert_chat(1, "chat", "").await.unwrap();
        store.insert_author(10, "author", "").await.unwrap();

        let stored = store.insert_message(msg(500, 1, 10, 1_600_000_000)).await.unwrap();
        assert_eq!(stored.remote_id, 500);
        assert_eq!(stored.kind, "n");

        let found = store.get_message_by_remote(500, "n").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        // Same remote id under a different kind is a different key.
        assert!(store.get_message_by_remote(500, "e").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_message_views_newest_first() {
        let (_dir, store) = temp_store().await;
        store.insert_chat(1, "chat", "").await.unwrap();
        store.insert_author(10, "Alice", "").await.unwrap();

        for (remote_id, secs) in [(1, 100), (2, 300), (3, 200)] {
            store.insert_message(msg(remote_id, 1, 10, secs)).await.unwrap();
        }

        let views = store.list_message_views(1, None, 10, 0).await.unwrap();
        let order: Vec<i64> = views.iter().map(|v| v.remote_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(views[0].author_title, "Alice");
    }

    #[tokio::test]
    async fn test_search_matches_text_and_author_title() {
        let (_dir, store) = temp_store().await;
        store.insert_chat(1, "chat", "").await.unwrap();
        store.insert_author(10, "Alice", "").await.unwrap();
        store.insert_author(20, "Bob", "").await.unwrap();

        let mut a = msg(1, 1, 10, 100);
        a.text = "hello world".to_string();
        store.insert_message(a).await.unwrap();
        let mut b = msg(2, 1, 20, 200);
        b.text = "unrelated".to_string();
        store.insert_message(b).await.unwrap();

        assert_eq!(store.count_messages(1, Some("hello")).await.unwrap(), 1);
        assert_eq!(store.count_messages(1, Some("Bob")).await.unwrap(), 1);
        assert_eq!(store.count_messages(1, None).await.unwrap(), 2);

        let views = store.list_message_views(1, Some("Bob"), 10, 0).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].remote_id, 2);
    }

    #[tokio::test]
    async fn test_chat_list_counts_and_filter() {
        let (_dir, store) = temp_store().await;
        store.insert_chat(1, "Work", "").await.unwrap();
        store.insert_chat(2, "Family", "").await.unwrap();
        store.insert_author(10, "Alice", "").await.unwrap();
        store.insert_message(msg(1, 1, 10, 100)).await.unwrap();
        store.insert_message(msg(2, 1, 10, 200)).await.unwrap();

        let all = store.list_chats(None).await.unwrap();
        assert_eq!(all.len(), 2);
        let work = all.iter().find(|c| c.id == 1).unwrap();
        assert_eq!(work.message_count, 2);

        let filtered = store.list_chats(Some("Fam")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 2);
        assert_eq!(filtered[0].message_count, 0);
    }
}
