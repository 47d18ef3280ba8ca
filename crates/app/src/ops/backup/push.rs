use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Upload the encrypted configuration to the backup gist")]
pub struct Push;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Push {
    type Error = PushError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let transport = state.gist_transport().await?;
        let id = state.backup_push(&transport).await?;
        Ok(format!("Configuration backed up to gist {}", id))
    }
}
