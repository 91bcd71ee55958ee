// SQLite-backed comment store.
//
// Tables:
// - comments: Comment content, pending flag and provenance
// - users: Comment authors
// - sites: Named sites with their comma separated URL list

use crate::core::moderation::{Comment, CommentStore, Site, StoreError, User};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteCommentStore {
    pool: Pool<Sqlite>,
}

impl SqliteCommentStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sites (
                name TEXT PRIMARY KEY,
                urls TEXT NOT NULL DEFAULT ''
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                is_pending BOOLEAN NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL,
                site_name TEXT NOT NULL DEFAULT '',
                page_key TEXT NOT NULL DEFAULT '',
                ip TEXT NOT NULL DEFAULT '',
                user_agent TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_comments_pending
                ON comments(site_name, is_pending);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(())
    }

    /// Find a user by name and email, creating one if none exists.
    pub async fn find_or_create_user(&self, name: &str, email: &str) -> Result<User, StoreError> {
        let existing = sqlx::query("SELECT id FROM users WHERE name = ? AND email = ?")
            .bind(name)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        let id = match existing {
            Some(row) => row.get::<i64, _>("id"),
            None => sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                .bind(name)
                .bind(email)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::StorageError(e.to_string()))?
                .last_insert_rowid(),
        };

        Ok(User {
            id: id as u64,
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    pub async fn save_site(&self, site: &Site) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sites (name, urls) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET urls = excluded.urls
            "#,
        )
        .bind(&site.name)
        .bind(&site.urls)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;
        Ok(())
    }

    /// Insert a new comment and fill in its id.
    pub async fn create_comment(&self, comment: &mut Comment) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (content, is_pending, user_id, site_name, page_key, ip, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comment.content)
        .bind(comment.is_pending)
        .bind(comment.user_id as i64)
        .bind(&comment.site_name)
        .bind(&comment.page_key)
        .bind(&comment.ip)
        .bind(&comment.user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        comment.id = result.last_insert_rowid() as u64;
        Ok(())
    }

    fn map_comment(row: &SqliteRow) -> Comment {
        Comment {
            id: row.get::<i64, _>("id") as u64,
            content: row.get("content"),
            is_pending: row.get("is_pending"),
            user_id: row.get::<i64, _>("user_id") as u64,
            site_name: row.get("site_name"),
            page_key: row.get("page_key"),
            ip: row.get("ip"),
            user_agent: row.get("user_agent"),
        }
    }
}

#[async_trait]
impl CommentStore for SqliteCommentStore {
    async fn update_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE comments SET content = ?, is_pending = ? WHERE id = ?")
            .bind(&comment.content)
            .bind(comment.is_pending)
            .bind(comment.id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(comment.id));
        }
        Ok(())
    }

    async fn fetch_user_for_comment(&self, comment: &Comment) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
            .bind(comment.user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        // A comment whose author was deleted is judged anonymously.
        Ok(row
            .map(|r| User {
                id: r.get::<i64, _>("id") as u64,
                name: r.get("name"),
                email: r.get("email"),
            })
            .unwrap_or_default())
    }

    async fn find_site(&self, name: &str) -> Result<Option<Site>, StoreError> {
        let row = sqlx::query("SELECT name, urls FROM sites WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(row.map(|r| Site {
            name: r.get("name"),
            urls: r.get("urls"),
        }))
    }

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, content, is_pending, user_id, site_name, page_key, ip, user_agent
            FROM comments WHERE id = ?
            "#,
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::StorageError(e.to_string()))?;

        Ok(row.as_ref().map(Self::map_comment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteCommentStore {
        // One connection so every query sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteCommentStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn update_persists_content_and_pending_flag() {
        let store = store().await;
        let user = store.find_or_create_user("dave", "dave@example.com").await.unwrap();
        let again = store.find_or_create_user("dave", "dave@example.com").await.unwrap();
        assert_eq!(again.id, user.id);

        let mut comment = Comment {
            content: "original".to_string(),
            user_id: user.id,
            site_name: "blog".to_string(),
            ..Default::default()
        };
        store.create_comment(&mut comment).await.unwrap();
        assert!(comment.id > 0);

        comment.content = "rewritten".to_string();
        comment.is_pending = true;
        store.update_comment(&comment).await.unwrap();

        let loaded = store.find_comment(comment.id).await.unwrap().unwrap();
        assert_eq!(loaded, comment);
        assert_eq!(store.fetch_user_for_comment(&loaded).await.unwrap(), user);
    }

    #[tokio::test]
    async fn updating_unknown_comment_is_not_found() {
        let store = store().await;
        let ghost = Comment {
            id: 999,
            ..Default::default()
        };

        assert!(matches!(
            store.update_comment(&ghost).await,
            Err(StoreError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn sites_are_upserted_by_name() {
        let store = store().await;
        store
            .save_site(&Site {
                name: "blog".to_string(),
                urls: "https://old.example.com".to_string(),
            })
            .await
            .unwrap();
        store
            .save_site(&Site {
                name: "blog".to_string(),
                urls: "https://new.example.com, https://alt.example.com".to_string(),
            })
            .await
            .unwrap();

        let site = store.find_site("blog").await.unwrap().unwrap();
        assert_eq!(site.first_url(), "https://new.example.com");
        assert!(store.find_site("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_author_resolves_to_anonymous_user() {
        let store = store().await;
        let comment = Comment {
            user_id: 12345,
            ..Default::default()
        };

        assert_eq!(store.fetch_user_for_comment(&comment).await.unwrap(), User::default());
    }
}
