//! Login command - Authorize drivesync against the user's drive
//!
//! Runs the OAuth2 authorization-code flow with PKCE on a loopback
//! callback server and stores the tokens in
//! `<home>/.drivesync/credentials.json`.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use drivesync_drive::{DriveAuthAdapter, OAuth2Config, TokenStore};
use drivesync_index::MetadataStore;

use super::{CommandContext, CommandStatus};

#[derive(Debug, Args)]
pub struct LoginCommand;

impl LoginCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<CommandStatus> {
        authorize(ctx).await?;
        let out = ctx.output();
        let credentials = ctx.credentials_path();
        out.success(&format!("Credentials saved to {}", credentials.display()));
        out.report(&serde_json::json!({ "credentials": credentials }))?;
        Ok(CommandStatus::Done)
    }
}

/// Run the interactive flow and persist the resulting tokens
pub async fn authorize(ctx: &CommandContext) -> Result<()> {
    let out = ctx.output();
    let oauth = OAuth2Config::from_config(&ctx.config.auth)?;
    MetadataStore::ensure_dir(&ctx.home)?;

    info!(redirect_uri = %oauth.redirect_uri(), "Starting OAuth2 login");
    out.info("Opening browser for Google login...");
    let tokens = DriveAuthAdapter::new(oauth)
        .login()
        .await
        .context("OAuth2 login failed")?;

    TokenStore::new(ctx.credentials_path())
        .store(&tokens)
        .context("Failed to store credentials")?;
    info!(expires_at = %tokens.expires_at, "Logged in");
    Ok(())
}
