use std::fmt;

/// Pipeline stage of `Installer::install_and_enable`, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum Stage {
    Render,
    Install,
    Reload,
    Enable,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Render => "render",
            Stage::Install => "install",
            Stage::Reload => "reload",
            Stage::Enable => "enable",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report for writing a unit file.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct WriteReport {
    /// Whether the file content changed.
    pub changed: bool,
    /// Path written (or existing path when unchanged).
    pub path_written: String,
    /// File mode after the write.
    pub mode: u32,
}

/// A single unit file change entry returned by systemd (`symlink`, `unlink`, ...).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct UnitFileChange {
    pub kind: String,
    pub path: String,
    pub source: Option<String>,
}

impl UnitFileChange {
    pub(crate) fn from_dbus(item: (String, String, String)) -> Self {
        let (kind, path, source) = item;
        let source = if source.is_empty() {
            None
        } else {
            Some(source)
        };
        Self { kind, path, source }
    }
}

/// Report returned by enabling a unit file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct EnableReport {
    /// Whether the unit file has an `[Install]` section.
    pub carries_install_info: bool,
    /// Symlinks created. Empty when the unit was already enabled.
    pub changes: Vec<UnitFileChange>,
}

/// Report returned by a successful `install_and_enable`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct InstallReport {
    /// Canonical unit name (`<name>.service`).
    pub unit: String,
    pub wrote: WriteReport,
    pub enabled: EnableReport,
}

impl InstallReport {
    /// Operator commands bound to the installed unit.
    pub fn usage_hints(&self) -> Vec<String> {
        let unit = &self.unit;
        vec![
            format!("start:   systemctl start {unit}"),
            format!("stop:    systemctl stop {unit}"),
            format!("restart: systemctl restart {unit}"),
            format!("status:  systemctl status {unit}"),
            format!("logs:    journalctl -u {unit} -f"),
            format!("disable: systemctl disable {unit}"),
        ]
    }
}
