//! Backup command - encrypted configuration backup in a GitHub gist
//!
//! - rmount backup config    - Show or set the gist token and id
//! - rmount backup push      - Upload the sealed configuration
//! - rmount backup pull      - Replace the configuration with a backup

use clap::{Args, Subcommand};

pub mod config;
pub mod pull;
pub mod push;

use crate::op::Op;

crate::command_enum! {
    (Config, config::Config),
    (Push, push::Push),
    (Pull, pull::Pull),
}

pub type BackupCommand = Command;

#[derive(Args, Debug, Clone)]
#[command(about = "Back up the encrypted configuration to a GitHub gist")]
pub struct Backup {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[async_trait::async_trait]
impl Op for Backup {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
