use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use rmount::daemon::MountRequest;
use rmount::{spawn_service, ServiceConfig, StateError};

#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Data source to mount on startup, as name[:remote/path]; repeatable
    #[arg(long = "mount", value_name = "NAME[:REMOTE]")]
    pub mounts: Vec<MountRequest>,

    /// Seconds between reconciliations with the live mount processes
    #[arg(long, default_value_t = 30)]
    pub reconcile_interval: u64,

    /// Seconds a new mount must stay up to count as mounted
    #[arg(long, default_value_t = 2)]
    pub mount_settle: u64,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    pub log_level: tracing::Level,

    /// Also write daily log files here (defaults to <rmount dir>/logs with --log-to-file)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Write daily log files under the rmount directory
    #[arg(long)]
    pub log_to_file: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("state error: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Run {
    type Error = RunError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let app = ctx.app_state()?;

        let log_dir = match (&self.log_dir, self.log_to_file) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(app.logs_path.clone()),
            (None, false) => None,
        };

        let mut config = ServiceConfig::new(app.rmount_dir.clone());
        config.reconcile_interval = Duration::from_secs(self.reconcile_interval.max(1));
        config.mount_settle = Duration::from_secs(self.mount_settle);
        config.mounts = self.mounts.clone();
        config.log_level = self.log_level;
        config.log_dir = log_dir;

        spawn_service(&config, ctx.passphrase.as_deref()).await;
        Ok("rmount stopped".to_string())
    }
}
