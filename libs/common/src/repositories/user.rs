//! User repository for database operations

use anyhow::Result;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use crate::error::unique_violation;
use crate::models::{Location, NewUser, Role, UpdateProfile, User};

const USER_COLUMNS: &str = r#"
    id, role, first_name, last_name, email, username, photo, password,
    reset_password_token, verification_token, is_active, is_verified,
    created_at, updated_at
"#;

fn user_from_row(row: &PgRow) -> User {
    let role: String = row.get("role");

    User {
        id: row.get("id"),
        role: Role::from_db(&role),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        username: row.get("username"),
        photo: row.get("photo"),
        password: row.get("password"),
        reset_password_token: row.get("reset_password_token"),
        verification_token: row.get("verification_token"),
        is_active: row.get("is_active"),
        is_verified: row.get("is_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.username);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, username, password, photo)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password_hash)
        .bind(&new_user.photo)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "User already exists"))?;

        Ok(user_from_row(&row))
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}"))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Find a user by email, case-insensitively
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email = $1", &email.to_lowercase()).await
    }

    /// Find a user by username, case-insensitively
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username = $1", &username.to_lowercase()).await
    }

    /// Find a user by email or username
    pub async fn find_by_email_or_username(&self, email_or_username: &str) -> Result<Option<User>> {
        info!("Finding user by username or email: {}", email_or_username);
        self.find_one(
            "email = $1 OR username = $1",
            &email_or_username.to_lowercase(),
        )
        .await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    /// Case-insensitive substring search over names and email
    pub async fn search(&self, query: Option<&str>) -> Result<Vec<User>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.replace('%', "\\%").replace('_', "\\_")));

        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1::TEXT IS NULL
               OR first_name ILIKE $1
               OR last_name ILIKE $1
               OR email ILIKE $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Apply profile changes; absent fields keep their value
    pub async fn update_profile(&self, id: Uuid, changes: &UpdateProfile) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                username = COALESCE($4, username),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Username already taken"))?;

        Ok(user_from_row(&row))
    }

    pub async fn set_verification_token(&self, id: Uuid, token_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET verification_token = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET is_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn set_reset_password_token(&self, id: Uuid, token: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET reset_password_token = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store a new password hash and consume the pending reset token
    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password = $2, reset_password_token = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_photo(&self, id: Uuid, url: &str) -> Result<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET photo = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        Ok(user_from_row(&row))
    }

    /// Hard delete. Chats, conversations and metadata cascade.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record where the user was last seen from
    pub async fn upsert_metadata(&self, user_id: Uuid, ip: &str, location: &Location) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_metadata (id, user_id, ip, city, region, country, timezone, last_visit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                ip = EXCLUDED.ip,
                city = EXCLUDED.city,
                region = EXCLUDED.region,
                country = EXCLUDED.country,
                timezone = EXCLUDED.timezone,
                last_visit = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(ip)
        .bind(&location.city)
        .bind(&location.region)
        .bind(&location.country)
        .bind(&location.timezone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
