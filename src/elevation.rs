//! Scoped privilege for writing into the service manager's unit directory.
//!
//! An [`ElevationGuard`] is held for exactly as long as the unit file write takes; dropping it
//! releases the privilege on every exit path, including early returns through `?`.

use crate::{Error, Result};

use std::fmt;
use std::path::{Path, PathBuf};

/// Source of elevated write access to a directory.
pub trait Elevation {
    /// Acquire write access to `scope`, or fail with `Error::PermissionDenied`.
    fn acquire(&self, scope: &Path) -> Result<ElevationGuard>;
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// RAII guard for an acquired elevation.
#[must_use = "elevation is released as soon as the guard is dropped"]
pub struct ElevationGuard {
    scope: PathBuf,
    on_release: Option<ReleaseFn>,
}

impl ElevationGuard {
    /// Guard with nothing to undo on release.
    pub fn new(scope: impl Into<PathBuf>) -> Self {
        Self {
            scope: scope.into(),
            on_release: None,
        }
    }

    /// Guard that runs `release` exactly once when dropped.
    pub fn with_release(scope: impl Into<PathBuf>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            scope: scope.into(),
            on_release: Some(Box::new(release)),
        }
    }

    pub fn scope(&self) -> &Path {
        &self.scope
    }
}

impl fmt::Debug for ElevationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationGuard")
            .field("scope", &self.scope)
            .field("has_release", &self.on_release.is_some())
            .finish()
    }
}

impl Drop for ElevationGuard {
    fn drop(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(scope = %self.scope.display(), "elevation released");

        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

/// Elevation backed by the credentials of the current process.
///
/// The tool does not prompt for credentials itself; run it through `sudo` (or as root). Acquire
/// succeeds when the effective user can write into the scope directory and the mount is
/// read-write.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessPrivileges;

impl Elevation for ProcessPrivileges {
    fn acquire(&self, scope: &Path) -> Result<ElevationGuard> {
        let probe = nearest_existing_dir(scope).ok_or_else(|| Error::PermissionDenied {
            action: "elevate",
            detail: format!("no existing ancestor directory for {}", scope.display()),
        })?;

        check_writable(&probe)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(scope = %scope.display(), probe = %probe.display(), "elevation acquired");

        Ok(ElevationGuard::new(scope))
    }
}

fn nearest_existing_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.is_dir())
        .map(Path::to_path_buf)
}

#[cfg(unix)]
fn check_writable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let path = dir.to_string_lossy();
    if is_mount_read_only(&path) {
        return Err(Error::PermissionDenied {
            action: "elevate",
            detail: format!("{path} is on a read-only mount"),
        });
    }

    let meta = std::fs::metadata(dir).map_err(|e| Error::PermissionDenied {
        action: "elevate",
        detail: format!("stat {path}: {e}"),
    })?;

    let creds = ProcCreds::read().ok_or_else(|| Error::PermissionDenied {
        action: "elevate",
        detail: "cannot read process credentials from /proc/self/status".to_string(),
    })?;

    if creds.euid == 0 {
        return Ok(());
    }

    let mode = meta.mode();
    let uid = meta.uid();
    let gid = meta.gid();

    let (w, x) = if creds.euid == uid {
        (0o200, 0o100)
    } else if creds.in_group(gid) {
        (0o020, 0o010)
    } else {
        (0o002, 0o001)
    };

    if (mode & w != 0) && (mode & x != 0) {
        return Ok(());
    }
    Err(Error::PermissionDenied {
        action: "elevate",
        detail: format!(
            "uid {} cannot write to {path}; re-run as root (e.g. with sudo)",
            creds.euid
        ),
    })
}

#[cfg(not(unix))]
fn check_writable(dir: &Path) -> Result<()> {
    Err(Error::PermissionDenied {
        action: "elevate",
        detail: format!(
            "privilege checks are not supported on this platform ({})",
            dir.display()
        ),
    })
}

#[cfg(unix)]
fn is_mount_read_only(path: &str) -> bool {
    let mounts = match std::fs::read_to_string("/proc/mounts") {
        Ok(s) => s,
        Err(_) => return false,
    };

    let mut best_mount_len = 0usize;
    let mut best_ro = false;

    for line in mounts.lines() {
        let mut it = line.split_whitespace();
        let _dev = it.next();
        let Some(mountpoint) = it.next() else {
            continue;
        };
        let _fstype = it.next();
        let Some(opts) = it.next() else {
            continue;
        };

        let mountpoint = unescape_mount_field(mountpoint);
        if !is_under_mount(path, &mountpoint) {
            continue;
        }
        if mountpoint.len() >= best_mount_len {
            best_mount_len = mountpoint.len();
            best_ro = opts.split(',').any(|o| o == "ro");
        }
    }

    best_ro
}

fn is_under_mount(path: &str, mountpoint: &str) -> bool {
    if mountpoint == "/" {
        return path.starts_with('/');
    }
    if path == mountpoint {
        return true;
    }
    path.strip_prefix(mountpoint)
        .is_some_and(|rest| rest.starts_with('/'))
}

// /proc/mounts encodes space, tab, newline and backslash as `\ooo`.
fn unescape_mount_field(input: &str) -> String {
    let mut out = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let (Some(a), Some(b), Some(c)) = (chars.next(), chars.next(), chars.next()) else {
            out.push('\\');
            break;
        };
        let digits = [a, b, c];
        if digits.iter().all(|d| d.is_digit(8)) {
            let oct = digits
                .iter()
                .filter_map(|d| d.to_digit(8))
                .fold(0u32, |acc, v| acc * 8 + v);
            if let Some(ch) = char::from_u32(oct) {
                out.push(ch);
            }
        } else {
            out.push('\\');
            out.extend(digits);
        }
    }
    out
}

#[cfg(unix)]
struct ProcCreds {
    euid: u32,
    egid: u32,
    groups: Vec<u32>,
}

#[cfg(unix)]
impl ProcCreds {
    fn read() -> Option<Self> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        Self::parse(&status)
    }

    fn in_group(&self, gid: u32) -> bool {
        self.egid == gid || self.groups.contains(&gid)
    }

    fn parse(status: &str) -> Option<Self> {
        let mut euid = None;
        let mut egid = None;
        let mut groups = Vec::<u32>::new();

        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Uid:") {
                // real, effective, saved, filesystem
                euid = rest.split_whitespace().nth(1)?.parse::<u32>().ok();
            } else if let Some(rest) = line.strip_prefix("Gid:") {
                egid = rest.split_whitespace().nth(1)?.parse::<u32>().ok();
            } else if let Some(rest) = line.strip_prefix("Groups:") {
                groups.extend(rest.split_whitespace().filter_map(|g| g.parse::<u32>().ok()));
            }
        }

        Some(Self {
            euid: euid?,
            egid: egid?,
            groups,
        })
    }
}
