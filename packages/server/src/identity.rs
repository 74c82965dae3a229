use sea_orm::ConnectionTrait;
use tracing::{debug, info};

use crate::error::AppError;
use crate::store::{CreateOutcome, CredentialStore};
use crate::utils::hash;

/// Username and plaintext secret as presented by the client.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Turns presented credentials into a verified username.
///
/// The first request naming an unknown username registers it with the
/// presented secret. Later requests must present the same secret.
pub struct IdentityResolver<'a, C: ConnectionTrait> {
    store: CredentialStore<'a, C>,
}

impl<'a, C: ConnectionTrait> IdentityResolver<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self {
            store: CredentialStore::new(conn),
        }
    }

    pub async fn resolve(&self, creds: Credentials) -> Result<String, AppError> {
        if creds.username.is_empty() {
            return Err(AppError::InvalidCredentials);
        }

        if let Some(stored) = self.store.lookup(&creds.username).await? {
            return verify(creds, stored).await;
        }

        let hashed = hash_blocking(creds.password.clone()).await?;
        match self.store.create(&creds.username, &hashed).await? {
            CreateOutcome::Created => {
                info!(username = %creds.username, "Registered new user on first use");
                Ok(creds.username)
            }
            CreateOutcome::AlreadyExists => {
                // A concurrent request registered first; its hash is authoritative.
                debug!(username = %creds.username, "Lost registration race, verifying against winner");
                let stored = self.store.lookup(&creds.username).await?.ok_or_else(|| {
                    AppError::Internal("user vanished after unique violation".into())
                })?;
                verify(creds, stored).await
            }
        }
    }

    /// Register `creds` ahead of first use. An existing username is left
    /// untouched and reported as [`CreateOutcome::AlreadyExists`].
    pub async fn register(&self, creds: Credentials) -> Result<CreateOutcome, AppError> {
        if creds.username.is_empty() {
            return Err(AppError::InvalidCredentials);
        }
        if self.store.lookup(&creds.username).await?.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let hashed = hash_blocking(creds.password).await?;
        let outcome = self.store.create(&creds.username, &hashed).await?;
        if outcome == CreateOutcome::Created {
            info!(username = %creds.username, "Registered user");
        }
        Ok(outcome)
    }
}

async fn verify(creds: Credentials, stored: String) -> Result<String, AppError> {
    let password = creds.password;
    let valid = tokio::task::spawn_blocking(move || hash::verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("Password verify error: {e}")))?;

    if valid {
        Ok(creds.username)
    } else {
        Err(AppError::InvalidCredentials)
    }
}

async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))
}
