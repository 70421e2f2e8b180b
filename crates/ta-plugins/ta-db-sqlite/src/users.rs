use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use ta_core::models::{NewUser, User};
use ta_core::traits::UserRepo;
use ta_core::Role;

use crate::SqliteRepo;

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: Role::parse_lenient(row.get::<&str, _>("role")),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepo for SqliteRepo {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<i64> {
        let id = sqlx::query(
            "INSERT INTO users (username, email, display_name, password_hash, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.username.trim())
        .bind(user.email.trim())
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        log::info!("user #{id} {:?} created as {}", user.username, user.role.as_str());
        Ok(id)
    }

    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>> {
        let login = login.trim();
        let row = sqlx::query(
            "SELECT * FROM users WHERE username = ?1
             UNION ALL
             SELECT * FROM users WHERE email = ?1 AND username <> ?1
             LIMIT 1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
            .bind(username.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }

    async fn email_exists(&self, email: &str) -> anyhow::Result<bool> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }
}
