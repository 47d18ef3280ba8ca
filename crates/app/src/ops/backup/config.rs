use clap::Args;
use std::fmt;

use rmount::daemon::backup::TransportError;
use rmount::daemon::BackupSettings;
use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Show or set the backup gist settings")]
pub struct Config {
    /// GitHub token with the gist scope
    #[arg(long, env = "RMOUNT_GIST_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Id of an existing gist to back up into
    #[arg(long)]
    pub gist_id: Option<String>,

    /// Check the token against the GitHub API
    #[arg(long)]
    pub check: bool,
}

#[derive(Debug)]
pub struct ConfigOutput {
    settings: BackupSettings,
    checked: bool,
}

impl fmt::Display for ConfigOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.settings.has_token {
            self.settings.token.as_str()
        } else {
            "(not set)"
        };
        let gist = if self.settings.gist_id.is_empty() {
            "(none yet)"
        } else {
            self.settings.gist_id.as_str()
        };
        writeln!(f, "  Token:   {}", token)?;
        write!(f, "  Gist id: {}", gist)?;
        if self.checked {
            write!(f, "\n  Access:  ok")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("token check failed: {0}")]
    Check(#[from] TransportError),
}

#[async_trait::async_trait]
impl Op for Config {
    type Error = ConfigError;
    type Output = ConfigOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;

        if self.token.is_some() || self.gist_id.is_some() {
            state
                .set_backup(self.token.clone(), self.gist_id.clone())
                .await?;
        }
        if self.check {
            state.gist_transport().await?.test_access().await?;
        }

        Ok(ConfigOutput {
            settings: state.backup_settings().await,
            checked: self.check,
        })
    }
}
