//! List files of a data source's bucket

use clap::Args;
use std::fmt;

use rmount::daemon::storage::FileEntry;
use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "List the files of a data source at a prefix")]
pub struct Ls {
    /// Name of the data source
    #[arg(index = 1)]
    pub source: String,

    /// Directory prefix inside the bucket
    #[arg(index = 2, default_value = "")]
    pub prefix: String,
}

#[derive(Debug)]
pub struct LsOutput {
    entries: Vec<FileEntry>,
}

impl fmt::Display for LsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, "(empty)");
        }
        for entry in &self.entries {
            if entry.is_dir {
                writeln!(f, "{:>12}  {:<19}  {}/", "-", "", entry.name)?;
            } else {
                let modified = entry
                    .mod_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                writeln!(f, "{:>12}  {:<19}  {}", entry.size, modified, entry.name)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl Op for Ls {
    type Error = LsError;
    type Output = LsOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        let entries = state.list_files(&self.source, &self.prefix).await?;
        Ok(LsOutput { entries })
    }
}
