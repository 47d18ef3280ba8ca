use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Show whether rmount runs at login")]
pub struct Status;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Status {
    type Error = StatusError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let configured = state.config().await.auto_start;
        let installed = state.auto_start_enabled().await;

        Ok(match (configured, installed) {
            (true, true) => "enabled".to_string(),
            (false, false) => "disabled".to_string(),
            (true, false) => "enabled in the configuration, but no login entry is installed; run 'rmount autostart enable'".to_string(),
            (false, true) => "disabled in the configuration, but a login entry is installed; run 'rmount autostart disable'".to_string(),
        })
    }
}
