//! Credential check subcommand

use clap::Parser;
use tracing::info;

use super::{Cli, CliError};
use crate::fetcher::TokenAuthority;
use crate::identity::OrganizationId;

/// Obtain a token once and report the organization it is scoped to
#[derive(Parser, Debug)]
pub struct VerifyCommand {}

impl VerifyCommand {
    /// Execute the verification
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let authority = cli.authority()?;
        let token = authority.acquire().await?;
        info!("Token obtained from {}", authority.token_url());

        let org_id = OrganizationId::from_token(&token)?;
        println!("Credentials OK");
        println!("  Organization: {}", org_id);
        Ok(())
    }
}
