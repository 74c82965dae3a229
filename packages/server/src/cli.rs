use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use sea_orm::ConnectionTrait;

use crate::identity::{Credentials, IdentityResolver};
use crate::store::CreateOutcome;

/// Object detection API server.
#[derive(Parser, Debug)]
#[command(name = "vision-server", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (the default)
    Serve,

    /// Register a user ahead of first use
    AddUser {
        username: String,
        password: String,
    },
}

/// Register `username` in the configured database.
///
/// Fails when the username is already taken; the stored secret is left as is.
pub async fn add_user<C: ConnectionTrait>(
    conn: &C,
    username: String,
    password: String,
) -> Result<()> {
    let outcome = IdentityResolver::new(conn)
        .register(Credentials {
            username: username.clone(),
            password,
        })
        .await
        .map_err(|e| anyhow!("registering {username:?}: {e:?}"))?;

    match outcome {
        CreateOutcome::Created => Ok(()),
        CreateOutcome::AlreadyExists => bail!("user '{username}' already exists"),
    }
}
