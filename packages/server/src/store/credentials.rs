use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    Set, SqlErr,
};

use crate::entity::user;

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another writer registered the username first.
    AlreadyExists,
}

/// Username to password-hash mapping backed by the `user` table.
pub struct CredentialStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> CredentialStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Stored password hash for `username`, if registered.
    pub async fn lookup(&self, username: &str) -> Result<Option<String>, DbErr> {
        user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .select_only()
            .column(user::Column::Password)
            .into_tuple()
            .one(self.conn)
            .await
    }

    /// Register `username`. The unique index on `username` decides races.
    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<CreateOutcome, DbErr> {
        let model = user::ActiveModel {
            username: Set(username.to_string()),
            password: Set(password_hash.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        match model.insert(self.conn).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                tracing::debug!(username, "Registration race: username already taken");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}
