//! Reconstruct active mounts from process argument vectors
//!
//! On Linux the argument vector of every process is read from
//! `/proc/<pid>/cmdline`, where arguments are NUL-separated and survive
//! intact. Elsewhere the input is `ps -eo pid=,args=` output, which joins
//! arguments with spaces: an argument containing whitespace cannot be told
//! apart from two arguments there, so [`check_listable`] rejects such paths
//! up front.
//!
//! Only `rclone [flags] mount [flags] <remote> <local>` invocations are
//! reported. Argument order is not assumed; flags are skipped according to
//! whether they take a value.

use std::path::{Path, PathBuf};

use super::{ActiveMount, DriverError};

const PROGRAM: &str = "rclone";
const MOUNT_SUBCOMMANDS: [&str; 3] = ["mount", "cmount", "nfsmount"];

/// Long flags that consume the following argument when written without `=`
const VALUE_FLAGS: &[&str] = &[
    "--config",
    "--cache-dir",
    "--vfs-cache-mode",
    "--vfs-cache-max-age",
    "--vfs-cache-max-size",
    "--vfs-cache-poll-interval",
    "--vfs-read-chunk-size",
    "--vfs-read-chunk-size-limit",
    "--vfs-write-back",
    "--dir-cache-time",
    "--poll-interval",
    "--attr-timeout",
    "--buffer-size",
    "--log-file",
    "--log-level",
    "--log-format",
    "--volname",
    "--devname",
    "--uid",
    "--gid",
    "--umask",
    "--dir-perms",
    "--file-perms",
    "--transfers",
    "--checkers",
    "--user-agent",
    "--rc-addr",
    "--stats",
    "--max-read-ahead",
    "--daemon-timeout",
    "--daemon-wait",
    "--option",
    "--fuse-flag",
    "--bwlimit",
];

/// Short flags that consume the following argument
const SHORT_VALUE_FLAGS: &[&str] = &["-o"];

/// Whether live mounts are read from exact argument vectors on this platform
pub const EXACT_ARGUMENTS: bool = cfg!(target_os = "linux");

/// Fail if a mount at `path` could not be recognised in the process listing.
/// Only whitespace is a problem, and only when arguments are not `exact`.
pub fn check_listable(path: &Path, exact: bool) -> Result<(), DriverError> {
    if !exact && path.to_string_lossy().chars().any(char::is_whitespace) {
        return Err(DriverError::UnlistablePath(path.to_path_buf()));
    }
    Ok(())
}

/// Parse a full `ps -eo pid=,args=` listing
pub fn parse_process_list(listing: &str) -> Vec<ActiveMount> {
    listing.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ActiveMount> {
    let mut fields = line.split_whitespace();
    let pid = fields.next()?.parse::<u32>().ok()?;
    let args: Vec<&str> = fields.collect();
    parse_args(pid, &args)
}

/// Parse the content of `/proc/<pid>/cmdline`
pub fn parse_cmdline(pid: u32, cmdline: &[u8]) -> Option<ActiveMount> {
    let text = String::from_utf8_lossy(cmdline);
    let text = text.strip_suffix('\0').unwrap_or(&text);
    let args: Vec<&str> = text.split('\0').collect();
    parse_args(pid, &args)
}

fn parse_args(pid: u32, args: &[&str]) -> Option<ActiveMount> {
    let (program, rest) = args.split_first()?;
    if Path::new(program).file_name()? != PROGRAM {
        return None;
    }

    let positionals = positionals(rest);
    let (subcommand, positionals) = positionals.split_first()?;
    if !MOUNT_SUBCOMMANDS.contains(subcommand) {
        return None;
    }

    let [remote, local, ..] = positionals else {
        return None;
    };
    if local.is_empty() {
        return None;
    }
    let (name, remote) = remote.split_once(':')?;
    if name.is_empty() {
        return None;
    }

    Some(ActiveMount {
        pid: Some(pid),
        name: name.to_string(),
        remote: remote.to_string(),
        local_path: PathBuf::from(*local),
    })
}

/// Arguments that are neither flags nor flag values
fn positionals<'a>(args: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if *arg == "--" {
            out.extend(iter.by_ref().copied());
            break;
        }
        if arg.starts_with("--") {
            if !arg.contains('=') && VALUE_FLAGS.contains(arg) {
                iter.next();
            }
            continue;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            if SHORT_VALUE_FLAGS.contains(arg) {
                iter.next();
            }
            continue;
        }
        out.push(*arg);
    }

    out
}
