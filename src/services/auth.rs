//! User accounts and password verification
//!
//! Passwords are stored as Argon2id hashes. The service owns all reads and
//! writes of the `users` table; handlers never touch it directly.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::rngs::OsRng;
use sqlx::{Row, SqlitePool};

use crate::models::User;

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, is_admin, created_at, updated_at";

pub struct AuthService {
    pool: SqlitePool,
}

impl AuthService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
        Ok(hash.to_string())
    }

    /// Constant-time comparison against a stored hash; a malformed stored
    /// hash is an error, not a mismatch
    pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Look up the user and check the password. Unknown email and wrong
    /// password both come back as `None` so callers cannot tell them apart.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self.get_user_by_email(email).await? {
            Some(user) if Self::verify_password(password, &user.password_hash)? => Ok(Some(user)),
            _ => Ok(None),
        }
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by id")?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Create a new user
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        is_admin: bool,
    ) -> Result<User> {
        if self.get_user_by_email(email).await?.is_some() {
            anyhow::bail!("Email already exists");
        }

        let password_hash = Self::hash_password(password)?;
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, display_name, is_admin, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(email)
        .bind(&password_hash)
        .bind(display_name)
        .bind(is_admin)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to create user")?;

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            password_hash,
            display_name: display_name.to_string(),
            is_admin,
            created_at: now,
            updated_at: now,
        })
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        is_admin: row.get("is_admin"),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
    }
}
