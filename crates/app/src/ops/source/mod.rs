//! Source command - manage S3 data sources
//!
//! - rmount source list      - List configured data sources
//! - rmount source add       - Add a data source
//! - rmount source update    - Change (or rename) a data source
//! - rmount source remove    - Remove a data source

use clap::{Args, Subcommand};

pub mod add;
pub mod list;
pub mod remove;
pub mod update;

use crate::op::Op;

crate::command_enum! {
    (List, list::List),
    (Add, add::Add),
    (Update, update::Update),
    (Remove, remove::Remove),
}

pub type SourceCommand = Command;

#[derive(Args, Debug, Clone)]
#[command(about = "Manage S3 data sources")]
pub struct Source {
    #[command(subcommand)]
    pub command: SourceCommand,
}

#[async_trait::async_trait]
impl Op for Source {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
