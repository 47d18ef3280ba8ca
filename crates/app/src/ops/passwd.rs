use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Re-encrypt the configuration under a new passphrase")]
pub struct Passwd {
    /// The new passphrase
    #[arg(long, env = "RMOUNT_NEW_PASSPHRASE", hide_env_values = true)]
    pub new: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PasswdError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("the current passphrase is required (--passphrase or RMOUNT_PASSPHRASE)")]
    MissingCurrent,
    #[error("the new passphrase must not be empty")]
    EmptyNew,
}

#[async_trait::async_trait]
impl Op for Passwd {
    type Error = PasswdError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let current = ctx.passphrase.as_deref().ok_or(PasswdError::MissingCurrent)?;
        if self.new.is_empty() {
            return Err(PasswdError::EmptyNew);
        }

        let state = ctx.open_state().await?;
        state.change_passphrase(current, &self.new).await?;
        Ok("Passphrase changed".to_string())
    }
}
