use std::fmt;

use serde::Serialize;

/// Build metadata captured by `build.rs` at compile time.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub pkg_version: &'static str,
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub rust_version: &'static str,
    pub target: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("REPO_VERSION"),
        pkg_version: env!("CARGO_PKG_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        rust_version: env!("RUST_VERSION"),
        target: env!("BUILD_TARGET"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rmount {} ({})", self.pkg_version, self.version)?;
        writeln!(f, "  profile: {}", self.build_profile)?;
        writeln!(f, "  built:   {}", self.build_timestamp)?;
        writeln!(f, "  rustc:   {}", self.rust_version)?;
        write!(f, "  target:  {}", self.target)
    }
}
