use crate::options::OverwritePolicy;
use crate::types::report::WriteReport;
use crate::{Error, Result};

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// rw-r--r--
pub(crate) const UNIT_FILE_MODE: u32 = 0o644;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn write_unit_file(
    systemd_system_dir: &Path,
    unit: &str,
    contents: &str,
    overwrite: OverwritePolicy,
) -> Result<WriteReport> {
    validate_unit_file_name(unit)?;

    let path = unit_file_path(systemd_system_dir, unit);
    fs::create_dir_all(systemd_system_dir)
        .map_err(|e| map_unitfile_io("create unit directory", systemd_system_dir, e))?;

    let existing = match fs::read(&path) {
        Ok(b) => Some(b),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(map_unitfile_io("read unit file", &path, e)),
    };

    match existing {
        Some(existing) if existing == contents.as_bytes() => {
            set_mode(&path, UNIT_FILE_MODE)
                .map_err(|e| map_unitfile_io("set unit file mode", &path, e))?;
            return Ok(WriteReport {
                changed: false,
                path_written: path.to_string_lossy().into_owned(),
                mode: UNIT_FILE_MODE,
            });
        }
        Some(_) if overwrite == OverwritePolicy::Refuse => {
            return Err(Error::AlreadyExists {
                path: path.to_string_lossy().into_owned(),
            });
        }
        _ => {}
    }

    atomic_write(&path, contents.as_bytes(), UNIT_FILE_MODE)
        .map_err(|e| map_unitfile_io("write unit file", &path, e))?;

    Ok(WriteReport {
        changed: true,
        path_written: path.to_string_lossy().into_owned(),
        mode: UNIT_FILE_MODE,
    })
}

pub(crate) fn unit_file_exists(systemd_system_dir: &Path, unit: &str) -> bool {
    unit_file_path(systemd_system_dir, unit).is_file()
}

pub(crate) fn unit_file_path(systemd_system_dir: &Path, unit: &str) -> PathBuf {
    systemd_system_dir.join(unit)
}

fn validate_unit_file_name(unit: &str) -> Result<()> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(Error::invalid_input("unit must not be empty"));
    }
    if unit.contains('/') || unit.contains('\\') {
        return Err(Error::invalid_input(
            "unit must not contain path separators",
        ));
    }
    if unit.contains("..") {
        return Err(Error::invalid_input("unit must not contain '..'"));
    }
    Ok(())
}

fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;

    let tmp_path = loop {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!(
            ".{}.tmp-{}-{}",
            path.file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unit.service"),
            std::process::id(),
            n
        ));
        if !candidate.exists() {
            break candidate;
        }
    };

    let result = (|| {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        // chmod is not subject to the umask.
        set_mode(&tmp_path, mode)?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fsync_dir(dir)?;
    Ok(())
}

fn map_unitfile_io(context: &'static str, path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        return Error::PermissionDenied {
            action: "write_unit_file",
            detail: format!("{context} {}: {e}", path.to_string_lossy()),
        };
    }
    Error::IoError {
        context: format!("{context} {}: {e}", path.to_string_lossy()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let f = fs::File::open(dir)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
