use std::time::Duration;

/// What to do when a unit file with different content already exists.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum OverwritePolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Fail with `Error::AlreadyExists`. Identical content is not a conflict.
    Refuse,
}

/// Configuration options for `Installer`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct InstallerOptions {
    /// D-Bus method call timeout for `Reload` and `EnableUnitFiles`.
    pub manager_timeout: Duration,

    /// Directory the unit file is written to.
    ///
    /// Default: `/etc/systemd/system`.
    pub systemd_system_dir: String,

    /// Behavior when the unit file already exists with different content.
    pub overwrite: OverwritePolicy,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            manager_timeout: Duration::from_secs(30),
            systemd_system_dir: "/etc/systemd/system".to_string(),
            overwrite: OverwritePolicy::Overwrite,
        }
    }
}
