//! Chat and conversation persistence

use anyhow::Result;
use common::error::unique_violation;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::models::{Chat, Conversation};

fn chat_from_row(row: &PgRow) -> Chat {
    Chat {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn conversation_from_row(row: &PgRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        chat_id: row.get("chat_id"),
        role: row.get("role"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

/// Chat repository for database operations
#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Titles are unique per user
    pub async fn create(&self, user_id: Uuid, title: &str) -> Result<Chat> {
        let row = sqlx::query(
            r#"
            INSERT INTO chats (id, user_id, title)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Chat already exists"))?;

        Ok(chat_from_row(&row))
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, is_active, created_at, updated_at
            FROM chats
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chat_from_row).collect())
    }

    /// Only chats owned by `user_id` are visible
    pub async fn find(&self, user_id: Uuid, chat_id: Uuid) -> Result<Option<Chat>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, is_active, created_at, updated_at
            FROM chats
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(chat_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(chat_from_row))
    }

    /// Oldest first
    pub async fn conversations(&self, chat_id: Uuid) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, chat_id, role, content, created_at
            FROM conversations
            WHERE chat_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(conversation_from_row).collect())
    }

    pub async fn count_conversations(&self, chat_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Store a message unless the chat already holds `limit` of them.
    ///
    /// The chat row stays locked from the count to the insert so concurrent
    /// writers cannot both pass the check. Returns `None` when the quota is spent.
    pub async fn add_conversation(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        role: &str,
        content: &str,
        limit: Option<i64>,
    ) -> Result<Option<Conversation>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM chats WHERE id = $1 FOR UPDATE")
            .bind(chat_id)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(limit) = limit {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE chat_id = $1")
                    .bind(chat_id)
                    .fetch_one(&mut *tx)
                    .await?;

            if count >= limit {
                tx.rollback().await?;
                return Ok(None);
            }
        }

        let row = sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, chat_id, role, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, chat_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET updated_at = NOW() WHERE id = $1")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(conversation_from_row(&row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{
        models::NewUser,
        repositories::UserRepository,
        secret::hash_secret,
    };

    async fn connect() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        common::database::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL"]
    async fn test_concurrent_writers_respect_the_quota() {
        let pool = connect().await;
        let suffix = Uuid::new_v4().simple().to_string();
        let user = UserRepository::new(pool.clone())
            .create(&NewUser {
                first_name: "Quota".to_string(),
                last_name: "Tester".to_string(),
                email: format!("quota-{suffix}@example.com"),
                username: format!("quota-{suffix}"),
                password_hash: hash_secret("Passw0rd!").unwrap(),
                photo: None,
            })
            .await
            .unwrap();

        let chats = ChatRepository::new(pool.clone());
        let chat = chats.create(user.id, "quota").await.unwrap();
        let (user_id, chat_id) = (user.id, chat.id);

        let writers = (0..8).map(|i| {
            let chats = chats.clone();
            tokio::spawn(async move {
                chats
                    .add_conversation(user_id, chat_id, "user", &format!("message {i}"), Some(2))
                    .await
                    .unwrap()
            })
        });

        let mut stored = 0;
        for writer in writers.collect::<Vec<_>>() {
            if writer.await.unwrap().is_some() {
                stored += 1;
            }
        }

        assert_eq!(stored, 2);
        assert_eq!(chats.count_conversations(chat.id).await.unwrap(), 2);

        // unbounded callers are never refused
        let extra = chats
            .add_conversation(user.id, chat.id, "assistant", "admin reply", None)
            .await
            .unwrap();
        assert!(extra.is_some());

        UserRepository::new(pool).delete(user.id).await.unwrap();
    }
}
