use clap::Args;
use std::path::PathBuf;

use rmount::StateError;

use crate::op::Op;

#[derive(Args, Debug, Clone)]
#[command(about = "Show or set the directory mounts are created under")]
pub struct MountDir {
    /// New mount directory; prints the current one when omitted
    #[arg(index = 1)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum MountDirError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("mount directory must be an absolute path: {0}")]
    NotAbsolute(PathBuf),
}

#[async_trait::async_trait]
impl Op for MountDir {
    type Error = MountDirError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open_state().await?;
        match &self.path {
            None => Ok(state.config().await.mount_directory.display().to_string()),
            Some(path) if !path.is_absolute() => Err(MountDirError::NotAbsolute(path.clone())),
            Some(path) => {
                state.set_mount_directory(path.clone()).await?;
                Ok(format!("Mount directory set to {}", path.display()))
            }
        }
    }
}
