//! Update a data source in place

use clap::Args;

use common::config::S3DataSource;
use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Update an S3 data source; unset flags keep their value")]
pub struct Update {
    /// Current name of the data source
    #[arg(index = 1)]
    pub name: String,

    /// Rename the data source
    #[arg(long)]
    pub rename: Option<String>,

    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub access_key: Option<String>,

    #[arg(long)]
    pub secret_key: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    #[arg(long)]
    pub bucket: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

impl Update {
    fn apply(&self, mut ds: S3DataSource) -> S3DataSource {
        let fields = [
            (&self.rename, &mut ds.name),
            (&self.endpoint, &mut ds.endpoint),
            (&self.access_key, &mut ds.access_key),
            (&self.secret_key, &mut ds.secret_key),
            (&self.region, &mut ds.region),
            (&self.bucket, &mut ds.bucket),
            (&self.description, &mut ds.description),
        ];
        for (flag, field) in fields {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }
        ds
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Update {
    type Error = UpdateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let current = state.source(&self.name).await?;
        let updated = state.update_source(&self.name, self.apply(current)).await?;

        if updated.name == self.name {
            Ok(format!("Data source '{}' updated", updated.name))
        } else {
            Ok(format!(
                "Data source '{}' updated and renamed to '{}'",
                self.name, updated.name
            ))
        }
    }
}
