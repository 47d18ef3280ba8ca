pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rmount")]
#[command(about = "Mount S3 buckets locally through rclone")]
#[command(version)]
pub struct Args {
    /// Path to the rmount directory (defaults to ~/.rmount)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Passphrase of the encrypted configuration
    #[arg(long, global = true, env = "RMOUNT_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
