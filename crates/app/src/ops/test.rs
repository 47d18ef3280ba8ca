use clap::Args;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Check that a data source's credentials can list its bucket")]
pub struct Test {
    /// Name of the data source
    #[arg(index = 1)]
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Test {
    type Error = TestError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        state.test_source(&self.source).await?;
        Ok(format!("Connection to '{}' OK", self.source))
    }
}
