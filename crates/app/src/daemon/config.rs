use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::mount_manager::DEFAULT_SETTLE;
use super::reconcile::DEFAULT_INTERVAL;

/// A data source to mount when the service starts: `name[:remote]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub name: String,
    pub remote: String,
}

impl FromStr for MountRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, remote) = s.split_once(':').unwrap_or((s, ""));
        if name.is_empty() {
            return Err(format!("missing data source name in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            remote: remote.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the rmount directory (absolute path)
    pub rmount_dir: PathBuf,

    // mount management
    /// How often live mount processes are reconciled with the registry
    pub reconcile_interval: Duration,
    /// How long a new mount helper must stay alive to count as mounted
    pub mount_settle: Duration,
    /// Mounted on startup, in order
    pub mounts: Vec<MountRequest>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(rmount_dir: PathBuf) -> Self {
        Self {
            rmount_dir,
            reconcile_interval: DEFAULT_INTERVAL,
            mount_settle: DEFAULT_SETTLE,
            mounts: Vec::new(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mount_requests() {
        assert_eq!(
            "photos".parse::<MountRequest>().unwrap(),
            MountRequest {
                name: "photos".to_string(),
                remote: String::new()
            }
        );
        assert_eq!(
            "photos:2020/summer".parse::<MountRequest>().unwrap(),
            MountRequest {
                name: "photos".to_string(),
                remote: "2020/summer".to_string()
            }
        );
        assert!(":x".parse::<MountRequest>().is_err());
    }

    #[test]
    fn defaults() {
        let config = Config::new(PathBuf::from("/tmp/rm"));
        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.mount_settle, Duration::from_secs(2));
        assert!(config.log_dir.is_none());
    }
}
