//! SQLite store.
//!
//! One database file with four tables:
//! - `users`: accounts, email unique case-insensitively
//! - `user_profiles`: one row per user, keyed by `user_id`
//! - `conversations`: owned by a user
//! - `messages`: append-only, `id` gives the total order within a conversation
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision so
//! they sort lexicographically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use emberchat_core::error::StoreError;
use emberchat_core::message::{Conversation, ConversationId, Message, MessageId, ReplySource, Role};
use emberchat_core::store::{ConversationStore, NewMessage, ProfileStore, UserStore};
use emberchat_core::user::{User, UserId, UserProfile};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, source, created_at";
const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

/// A durable SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run migrations.
    ///
    /// Accepts `sqlite://path/to/file.db` or `sqlite::memory:` for an
    /// ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is its own database, so an
        // in-memory store must live on exactly one connection.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 6] = [
            (
                "users table",
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    password_hash TEXT NOT NULL,
                    is_active     INTEGER NOT NULL DEFAULT 1,
                    created_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_profiles table",
                r#"
                CREATE TABLE IF NOT EXISTS user_profiles (
                    user_id      INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                    display_name TEXT,
                    company_name TEXT,
                    phone        TEXT,
                    preferences  TEXT,
                    notes        TEXT,
                    updated_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    title      TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at)",
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id              INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    source          TEXT,
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, StoreError> {
        Ok(User {
            id: UserId(col(row, "id")?),
            email: col(row, "email")?,
            password_hash: col(row, "password_hash")?,
            is_active: col::<i64>(row, "is_active")? != 0,
            created_at: parse_ts(&col::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<UserProfile, StoreError> {
        Ok(UserProfile {
            user_id: UserId(col(row, "user_id")?),
            display_name: col(row, "display_name")?,
            company_name: col(row, "company_name")?,
            phone: col(row, "phone")?,
            preferences: col(row, "preferences")?,
            notes: col(row, "notes")?,
            updated_at: parse_ts(&col::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, StoreError> {
        Ok(Conversation {
            id: ConversationId(col(row, "id")?),
            user_id: UserId(col(row, "user_id")?),
            title: col(row, "title")?,
            created_at: parse_ts(&col::<String>(row, "created_at")?)?,
            updated_at: parse_ts(&col::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let role: String = col(row, "role")?;
        let source: Option<String> = col(row, "source")?;
        Ok(Message {
            id: MessageId(col(row, "id")?),
            conversation_id: ConversationId(col(row, "conversation_id")?),
            role: Role::from_str(&role).map_err(StoreError::QueryFailed)?,
            content: col(row, "content")?,
            source: source
                .as_deref()
                .map(ReplySource::from_str)
                .transpose()
                .map_err(StoreError::QueryFailed)?,
            created_at: parse_ts(&col::<String>(row, "created_at")?)?,
        })
    }

    async fn fetch_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query("SELECT * FROM user_profiles WHERE user_id = ?1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET profile: {e}")))?;
        row.as_ref().map(Self::row_to_profile).transpose()
    }
}

fn col<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp '{raw}': {e}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, is_active, created_at) VALUES (?1, ?2, 1, ?3)",
        )
        .bind(email)
        .bind(password_hash)
        .bind(ts(now))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("email {email}"))
            } else {
                StoreError::Storage(format!("INSERT user failed: {e}"))
            }
        })?;

        debug!(email, "Created user");
        Ok(User {
            id: UserId(result.last_insert_rowid()),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET user by email: {e}")))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET user: {e}")))?;
        row.as_ref().map(Self::row_to_user).transpose()
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.fetch_profile(user_id).await
    }

    async fn create_profile(&self, user_id: UserId) -> Result<UserProfile, StoreError> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, updated_at) VALUES (?1, ?2) ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id.0)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT profile failed: {e}")))?;

        self.fetch_profile(user_id)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("profile for user {user_id}")))
    }

    async fn update_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles
                (user_id, display_name, company_name, phone, preferences, notes, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                company_name = excluded.company_name,
                phone        = excluded.phone,
                preferences  = excluded.preferences,
                notes        = excluded.notes,
                updated_at   = excluded.updated_at
            "#,
        )
        .bind(profile.user_id.0)
        .bind(&profile.display_name)
        .bind(&profile.company_name)
        .bind(&profile.phone)
        .bind(&profile.preferences)
        .bind(&profile.notes)
        .bind(ts(profile.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT profile failed: {e}")))?;

        Ok(profile.clone())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        user_id: UserId,
        title: &str,
    ) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversations (user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(user_id.0)
        .bind(title)
        .bind(ts(now))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        Ok(Conversation {
            id: ConversationId(result.last_insert_rowid()),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET conversation: {e}")))?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>, StoreError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_id = ?1 \
             ORDER BY updated_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST conversations: {e}")))?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn list_recent_messages(
        &self,
        conversation_id: ConversationId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<Message>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Newest `limit` first, then flipped back to creation order.
        let sql = format!(
            "SELECT * FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = ?1 AND id < ?2
                ORDER BY id DESC LIMIT ?3
            ) ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.0)
            .bind(before.map_or(i64::MAX, |m| m.0))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST recent messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(ts(now))
            .bind(conversation_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE conversation failed: {e}")))?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("conversation {conversation_id}")));
        }

        let result = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, source, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.source.map(|s| s.as_str()))
        .bind(ts(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(Message {
            id: MessageId(result.last_insert_rowid()),
            conversation_id,
            role: message.role,
            content: message.content,
            source: message.source,
            created_at: now,
        })
    }

    async fn touch_conversation(&self, id: ConversationId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(ts(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("TOUCH conversation failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE messages failed: {e}")))?;

        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE conversation failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }
}
