//! Start `rmount run` at login
//!
//! macOS uses a LaunchAgent plist loaded through `launchctl`; other Unix
//! desktops use an XDG autostart entry. Both are generated from the path of
//! the running executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

pub const AUTOSTART_LABEL: &str = "io.rmount.agent";

#[derive(Debug, thiserror::Error)]
pub enum AutoStartError {
    #[error("autostart is not supported on this platform")]
    Unsupported,
    #[error("could not determine the home directory")]
    NoHomeDir,
    #[error("launchctl {action} failed: {output}")]
    Launchctl { action: &'static str, output: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    LaunchAgent,
    XdgAutostart,
}

#[derive(Debug, Clone)]
pub struct AutoStart {
    label: String,
    executable: PathBuf,
    entry_path: PathBuf,
    kind: EntryKind,
}

impl AutoStart {
    /// Entry for the current executable in the current user's session
    pub fn for_current_exe() -> Result<Self, AutoStartError> {
        let executable = std::env::current_exe()?;

        if cfg!(target_os = "macos") {
            let home = dirs::home_dir().ok_or(AutoStartError::NoHomeDir)?;
            Ok(Self::launch_agent(AUTOSTART_LABEL, executable, &home))
        } else if cfg!(unix) {
            let config = dirs::config_dir().ok_or(AutoStartError::NoHomeDir)?;
            Ok(Self::xdg(AUTOSTART_LABEL, executable, &config))
        } else {
            Err(AutoStartError::Unsupported)
        }
    }

    /// `<home>/Library/LaunchAgents/<label>.plist`
    pub fn launch_agent(label: &str, executable: PathBuf, home: &Path) -> Self {
        Self {
            label: label.to_string(),
            executable,
            entry_path: home
                .join("Library")
                .join("LaunchAgents")
                .join(format!("{}.plist", label)),
            kind: EntryKind::LaunchAgent,
        }
    }

    /// `<config_dir>/autostart/<label>.desktop`
    pub fn xdg(label: &str, executable: PathBuf, config_dir: &Path) -> Self {
        Self {
            label: label.to_string(),
            executable,
            entry_path: config_dir
                .join("autostart")
                .join(format!("{}.desktop", label)),
            kind: EntryKind::XdgAutostart,
        }
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry_path
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Contents of the entry file
    pub fn render(&self) -> String {
        let exe = self.executable.display().to_string();
        match self.kind {
            EntryKind::LaunchAgent => format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>
"#,
                xml_escape(&self.label),
                xml_escape(&exe)
            ),
            EntryKind::XdgAutostart => format!(
                "[Desktop Entry]\n\
                 Type=Application\n\
                 Name=rmount\n\
                 Comment=Mount configured S3 data sources\n\
                 Exec={} run\n\
                 Terminal=false\n\
                 NoDisplay=true\n\
                 X-GNOME-Autostart-enabled=true\n",
                desktop_exec_quote(&exe)
            ),
        }
    }

    pub async fn enable(&self) -> Result<(), AutoStartError> {
        if let Some(parent) = self.entry_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.entry_path, self.render()).await?;

        if self.kind == EntryKind::LaunchAgent {
            launchctl("load", &self.entry_path).await?;
        }
        tracing::info!(path = %self.entry_path.display(), "autostart enabled");
        Ok(())
    }

    pub async fn disable(&self) -> Result<(), AutoStartError> {
        if self.kind == EntryKind::LaunchAgent && self.is_enabled().await {
            launchctl("unload", &self.entry_path).await?;
        }

        match tokio::fs::remove_file(&self.entry_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(path = %self.entry_path.display(), "autostart disabled");
        Ok(())
    }

    pub async fn is_enabled(&self) -> bool {
        if !self.entry_path.exists() {
            return false;
        }
        match self.kind {
            EntryKind::XdgAutostart => true,
            EntryKind::LaunchAgent => Command::new("launchctl")
                .args(["list", self.label.as_str()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false),
        }
    }
}

async fn launchctl(action: &'static str, plist: &Path) -> Result<(), AutoStartError> {
    let output = Command::new("launchctl")
        .arg(action)
        .arg(plist)
        .stdin(Stdio::null())
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(AutoStartError::Launchctl {
            action,
            output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Quote an argument for the `Exec` key of a desktop entry
fn desktop_exec_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plist_contains_executable_and_run() {
        let entry = AutoStart::launch_agent(
            "io.rmount.agent",
            PathBuf::from("/Applications/R&D/rmount"),
            Path::new("/Users/u"),
        );
        assert_eq!(
            entry.entry_path(),
            Path::new("/Users/u/Library/LaunchAgents/io.rmount.agent.plist")
        );

        let plist = entry.render();
        assert!(plist.contains("<string>/Applications/R&amp;D/rmount</string>"));
        assert!(plist.contains("<string>run</string>"));
        assert!(plist.contains("<key>RunAtLoad</key>\n    <true/>"));
    }

    #[test]
    fn desktop_entry_quotes_exec() {
        let entry = AutoStart::xdg(
            "io.rmount.agent",
            PathBuf::from("/opt/my apps/rmount"),
            Path::new("/home/u/.config"),
        );
        assert_eq!(
            entry.entry_path(),
            Path::new("/home/u/.config/autostart/io.rmount.agent.desktop")
        );
        let desktop = entry.render();
        assert!(desktop.starts_with("[Desktop Entry]\n"));
        assert!(desktop.contains("Exec=\"/opt/my apps/rmount\" run\n"));
        assert_eq!(desktop_exec_quote("a$b"), "\"a\\$b\"");
    }

    #[tokio::test]
    async fn xdg_enable_disable_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let entry = AutoStart::xdg("rmount-test", PathBuf::from("/usr/bin/rmount"), temp.path());

        assert!(!entry.is_enabled().await);
        entry.enable().await.unwrap();
        assert!(entry.is_enabled().await);
        assert_eq!(
            std::fs::read_to_string(entry.entry_path()).unwrap(),
            entry.render()
        );

        entry.disable().await.unwrap();
        assert!(!entry.is_enabled().await);
        // Disabling twice is fine
        entry.disable().await.unwrap();
    }
}
