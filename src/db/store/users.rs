use sqlx::{Sqlite, SqliteExecutor};

use super::Store;
use crate::db::{now_timestamp, serialize_classes, NewUser, Session, User, UserFilter, UserPatch};

async fn fetch_user<'e>(executor: impl SqliteExecutor<'e>, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<Sqlite, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

impl Store {
    pub async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        fetch_user(&self.pool, id).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn count_users(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Users matching the filter, in id order.
    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, sqlx::Error> {
        let mut users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        users.retain(|u| {
            filter.role.map_or(true, |role| u.role == role)
                && filter
                    .class
                    .map_or(true, |class| u.assigned_classes.contains(&class))
        });
        Ok(users)
    }

    pub async fn create_user(&self, new: NewUser) -> Result<User, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, name, role, assigned_classes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.email.trim())
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.role.as_str())
        .bind(serialize_classes(&new.assigned_classes))
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_user(&self, id: i64, patch: &UserPatch) -> Result<Option<User>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = fetch_user(&mut *tx, id).await? else {
            return Ok(None);
        };
        let user = existing.merged(patch);

        sqlx::query("UPDATE users SET name = ?, assigned_classes = ? WHERE id = ?")
            .bind(&user.name)
            .bind(serialize_classes(&user.assigned_classes))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user))
    }

    pub async fn delete_user(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    pub async fn create_session(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: &str,
    ) -> Result<Session, sqlx::Error> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            token_hash: token_hash.to_string(),
            expires_at: expires_at.to_string(),
            created_at: now_timestamp(),
        };

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(&session.expires_at)
        .bind(&session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Resolve an unexpired session to its user.
    pub async fn user_for_session(&self, token_hash: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            INNER JOIN sessions s ON s.user_id = u.id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(token_hash)
        .bind(now_timestamp())
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
