use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Stop running rmount at login")]
pub struct Disable;

#[derive(Debug, thiserror::Error)]
pub enum DisableError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Disable {
    type Error = DisableError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        state.set_auto_start(false).await?;
        Ok("Autostart disabled".to_string())
    }
}
