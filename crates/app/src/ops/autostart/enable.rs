use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Register rmount to run at login")]
pub struct Enable;

#[derive(Debug, thiserror::Error)]
pub enum EnableError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Enable {
    type Error = EnableError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        state.set_auto_start(true).await?;
        // The login session has no terminal to prompt in
        Ok("Autostart enabled. The login session must provide RMOUNT_PASSPHRASE.".to_string())
    }
}
