use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{ImageId, Session, SessionId, StoredImage, User, UserId, VoteId},
    protocol::{ImageSummary, TallyEntry},
    store::{ImageRepository, SessionRepository, UserRepository, VoteRepository},
};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite-backed store for users, sessions, images and votes.
///
/// Cloning is cheap and every clone shares the same connection pool.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply schema migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for Storage {
    async fn insert_user(
        &self,
        username: &str,
        credential_hash: Option<&str>,
    ) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "INSERT INTO users (username, credential_hash) VALUES (?, ?)
             ON CONFLICT(username) DO NOTHING
             RETURNING id",
        )
        .bind(username)
        .bind(credential_hash)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to insert user '{username}'"))?;
        Ok(row.map(|r| UserId(r.get::<i64, _>(0))))
    }

    async fn find_user_by_name(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, credential_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>> {
        let row =
            sqlx::query("SELECT id, username, credential_hash, created_at FROM users WHERE id = ?")
                .bind(user_id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn set_credential_hash(&self, user_id: UserId, credential_hash: &str) -> Result<bool> {
        let affected = sqlx::query("UPDATE users SET credential_hash = ? WHERE id = ?")
            .bind(credential_hash)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .context("failed to update credential")?
            .rows_affected();
        Ok(affected == 1)
    }
}

#[async_trait]
impl SessionRepository for Storage {
    async fn insert_session(
        &self,
        session_id: &SessionId,
        name: &str,
        host_id: UserId,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO sessions (id, name, host_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(session_id.as_str())
        .bind(name)
        .bind(host_id.0)
        .execute(&mut *tx)
        .await
        .context("failed to insert session")?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query("INSERT INTO session_members (session_id, user_id) VALUES (?, ?)")
                .bind(session_id.as_str())
                .bind(host_id.0)
                .execute(&mut *tx)
                .await
                .context("failed to record host membership")?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn load_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT s.id, s.name, s.host_id, u.username, s.created_at
             FROM sessions s
             INNER JOIN users u ON u.id = s.host_id
             WHERE s.id = ?",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| session_from_row(&r)))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.host_id, u.username, s.created_at
             FROM sessions s
             INNER JOIN users u ON u.id = s.host_id
             ORDER BY s.rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn list_sessions_hosted_by(&self, host_id: UserId) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.host_id, u.username, s.created_at
             FROM sessions s
             INNER JOIN users u ON u.id = s.host_id
             WHERE s.host_id = ?
             ORDER BY s.rowid ASC",
        )
        .bind(host_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn add_member(&self, session_id: &SessionId, user_id: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO session_members (session_id, user_id) VALUES (?, ?)
             ON CONFLICT(session_id, user_id) DO NOTHING",
        )
        .bind(session_id.as_str())
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .context("failed to record membership")?;
        Ok(())
    }

    async fn is_member(&self, session_id: &SessionId, user_id: UserId) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM session_members WHERE session_id = ? AND user_id = ?)",
        )
        .bind(session_id.as_str())
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }
}

#[async_trait]
impl ImageRepository for Storage {
    async fn insert_image(
        &self,
        session_id: &SessionId,
        name: &str,
        mime_type: &str,
        data: &[u8],
    ) -> Result<ImageId> {
        let rec = sqlx::query(
            "INSERT INTO images (session_id, name, mime_type, data) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(session_id.as_str())
        .bind(name)
        .bind(mime_type)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to store image '{name}'"))?;
        Ok(ImageId(rec.get::<i64, _>(0)))
    }

    async fn list_images(&self, session_id: &SessionId) -> Result<Vec<ImageSummary>> {
        let rows = sqlx::query(
            "SELECT id, name, mime_type FROM images WHERE session_id = ? ORDER BY id ASC",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ImageSummary {
                image_id: ImageId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                mime_type: r.get::<String, _>(2),
            })
            .collect())
    }

    async fn load_image(&self, image_id: ImageId) -> Result<Option<StoredImage>> {
        let row = sqlx::query(
            "SELECT id, session_id, name, mime_type, data, created_at FROM images WHERE id = ?",
        )
        .bind(image_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredImage {
            image_id: ImageId(r.get::<i64, _>(0)),
            session_id: SessionId::new(r.get::<String, _>(1)),
            name: r.get::<String, _>(2),
            mime_type: r.get::<String, _>(3),
            data: r.get::<Vec<u8>, _>(4),
            created_at: r.get::<DateTime<Utc>, _>(5),
        }))
    }

    async fn session_for_image(&self, image_id: ImageId) -> Result<Option<SessionId>> {
        let row = sqlx::query("SELECT session_id FROM images WHERE id = ?")
            .bind(image_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| SessionId::new(r.get::<String, _>(0))))
    }
}

#[async_trait]
impl VoteRepository for Storage {
    async fn insert_vote(
        &self,
        user_id: UserId,
        session_id: &SessionId,
        image_id: ImageId,
    ) -> Result<Option<VoteId>> {
        // The unique (user_id, session_id) constraint is the only guard; a
        // losing concurrent insert sees no returned row.
        let row = sqlx::query(
            "INSERT INTO votes (user_id, session_id, image_id) VALUES (?, ?, ?)
             ON CONFLICT(user_id, session_id) DO NOTHING
             RETURNING id",
        )
        .bind(user_id.0)
        .bind(session_id.as_str())
        .bind(image_id.0)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert vote")?;
        Ok(row.map(|r| VoteId(r.get::<i64, _>(0))))
    }

    async fn vote_in_session(
        &self,
        user_id: UserId,
        session_id: &SessionId,
    ) -> Result<Option<ImageId>> {
        let row = sqlx::query("SELECT image_id FROM votes WHERE user_id = ? AND session_id = ?")
            .bind(user_id.0)
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ImageId(r.get::<i64, _>(0))))
    }

    async fn count_votes(&self, session_id: &SessionId) -> Result<Vec<TallyEntry>> {
        let rows = sqlx::query(
            "SELECT i.id, i.name, COUNT(v.id)
             FROM images i
             LEFT JOIN votes v ON v.image_id = i.id
             WHERE i.session_id = ?
             GROUP BY i.id, i.name
             ORDER BY i.id ASC",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| TallyEntry {
                image_id: ImageId(r.get::<i64, _>(0)),
                name: r.get::<String, _>(1),
                votes: u64::try_from(r.get::<i64, _>(2)).unwrap_or_default(),
            })
            .collect())
    }
}

fn user_from_row(r: &SqliteRow) -> User {
    User {
        user_id: UserId(r.get::<i64, _>(0)),
        username: r.get::<String, _>(1),
        credential_hash: r.get::<Option<String>, _>(2),
        created_at: r.get::<DateTime<Utc>, _>(3),
    }
}

fn session_from_row(r: &SqliteRow) -> Session {
    Session {
        session_id: SessionId::new(r.get::<String, _>(0)),
        name: r.get::<String, _>(1),
        host_id: UserId(r.get::<i64, _>(2)),
        host_username: r.get::<String, _>(3),
        created_at: r.get::<DateTime<Utc>, _>(4),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(parent) = sqlite_path(database_url)
        .as_deref()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

/// Filesystem path behind a `sqlite:` url, or `None` for in-memory and
/// non-sqlite urls.
pub fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path == ":memory:" {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
