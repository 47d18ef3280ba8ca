use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Replace the local configuration with the backup")]
pub struct Pull {
    /// Gist to restore from (defaults to the configured gist)
    #[arg(index = 1)]
    pub gist_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PullError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Pull {
    type Error = PullError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let transport = state.gist_transport().await?;
        let restored = state
            .backup_pull(&transport, self.gist_id.as_deref())
            .await?;
        Ok(format!(
            "Configuration restored: {} data source(s), mounts under {}",
            restored.s3_data_sources.len(),
            restored.mount_directory.display()
        ))
    }
}
