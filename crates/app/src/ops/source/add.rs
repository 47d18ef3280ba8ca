//! Add a data source

use clap::Args;
use std::fmt;

use common::config::S3DataSource;
use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Add an S3 data source")]
pub struct Add {
    /// Name of the data source (used as the rclone remote name)
    #[arg(index = 1)]
    pub name: String,

    /// S3 endpoint URL (empty for AWS)
    #[arg(long, default_value = "")]
    pub endpoint: String,

    /// Access key id
    #[arg(long, env = "RMOUNT_ACCESS_KEY")]
    pub access_key: String,

    /// Secret access key
    #[arg(long, env = "RMOUNT_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Region (defaults to us-east-1 when empty)
    #[arg(long, default_value = "")]
    pub region: String,

    /// Default bucket
    #[arg(long, default_value = "")]
    pub bucket: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Debug)]
pub struct AddOutput {
    source: S3DataSource,
}

impl fmt::Display for AddOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data source added!")?;
        writeln!(f, "  Name:     {}", self.source.name)?;
        writeln!(f, "  Id:       {}", self.source.id)?;
        writeln!(f, "  Endpoint: {}", display_or_default(&self.source.endpoint, "AWS"))?;
        writeln!(f, "  Bucket:   {}", display_or_default(&self.source.bucket, "-"))?;
        writeln!(f)?;
        writeln!(f, "Use 'rmount test {}' to check the connection.", self.source.name)
    }
}

pub(super) fn display_or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() {
        default
    } else {
        value
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Add {
    type Error = AddError;
    type Output = AddOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let source = state
            .add_source(S3DataSource {
                id: String::new(),
                name: self.name.clone(),
                endpoint: self.endpoint.clone(),
                access_key: self.access_key.clone(),
                secret_key: self.secret_key.clone(),
                region: self.region.clone(),
                bucket: self.bucket.clone(),
                description: self.description.clone(),
            })
            .await?;
        Ok(AddOutput { source })
    }
}
