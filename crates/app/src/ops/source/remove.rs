use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Remove an S3 data source")]
pub struct Remove {
    /// Name of the data source
    #[arg(index = 1)]
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Remove {
    type Error = RemoveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let removed = state.remove_source(&self.name).await?;
        Ok(format!("Data source '{}' removed", removed.name))
    }
}
