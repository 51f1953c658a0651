use crate::{Error, Result, util};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// systemd `Restart=...` policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum RestartPolicy {
    /// `Restart=no`.
    Never,
    /// `Restart=on-failure`.
    OnFailure,
    /// `Restart=always`.
    #[default]
    Always,
}

impl RestartPolicy {
    /// Value written to the unit file.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Never => "no",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Always => "always",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "never" | "no" => Ok(RestartPolicy::Never),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "always" => Ok(RestartPolicy::Always),
            other => Err(Error::invalid_input(format!(
                "restart policy must be one of never, on-failure, always (got {other:?})"
            ))),
        }
    }
}

/// Description of the service to install.
///
/// Every supported unit setting is a typed field; there is no way to inject raw lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct ServiceDescriptor {
    /// Unit name (shorthand names are canonicalized to `<name>.service`).
    pub name: String,
    /// `Description=...`; omitted when empty.
    pub description: String,
    /// `ExecStart=...` argv. `argv[0]` must be absolute.
    pub exec_start: Vec<String>,
    /// `WorkingDirectory=...`, absolute.
    pub working_directory: String,
    /// Optional `User=...`.
    pub user: Option<String>,
    /// Optional `Group=...`.
    pub group: Option<String>,
    /// Environment variables rendered as `Environment="K=V"`, in key order.
    pub environment: BTreeMap<String, String>,
    pub restart: RestartPolicy,
    /// `RestartSec=...`. Signed so that a negative request can be reported instead of wrapped.
    pub restart_delay_seconds: i64,
    /// `[Unit] After=...` entries; shorthand names get a `.target` suffix.
    pub after: BTreeSet<String>,
    /// `[Install] WantedBy=...` entries; shorthand names get a `.target` suffix.
    pub wanted_by: BTreeSet<String>,
}

impl ServiceDescriptor {
    /// Canonicalize and validate the unit name.
    pub fn unit_name(&self) -> Result<String> {
        util::canonicalize_unit_name(&self.name)
    }

    /// Render the unit file content.
    ///
    /// Output is a pure function of the descriptor.
    pub fn render(&self) -> Result<String> {
        let unit_name = self.unit_name()?;

        util::validate_no_control("description", &self.description)?;
        let description = self.description.trim();

        let after = normalize_targets("after", &self.after)?;
        let wanted_by = normalize_targets("wanted_by", &self.wanted_by)?;

        let exec_start = normalize_argv("exec_start", &self.exec_start)?;
        let working_directory = normalize_abs_path("working_directory", &self.working_directory)?;

        let user = normalize_opt_line("user", self.user.as_deref())?;
        let group = normalize_opt_line("group", self.group.as_deref())?;

        for (k, v) in &self.environment {
            util::validate_env_key(k)?;
            util::validate_no_control("env value", v)?;
        }

        if self.restart_delay_seconds < 0 {
            return Err(Error::invalid_input(format!(
                "restart_delay_seconds must be >= 0 (got {})",
                self.restart_delay_seconds
            )));
        }

        let mut out = String::new();
        out.push_str("# Managed by unitinstall. DO NOT EDIT.\n");
        out.push_str(&format!("# Unit: {unit_name}\n"));
        out.push_str("[Unit]\n");

        if !description.is_empty() {
            out.push_str("Description=");
            out.push_str(&util::escape_specifiers(description));
            out.push('\n');
        }
        if !after.is_empty() {
            out.push_str("After=");
            out.push_str(&after.join(" "));
            out.push('\n');
        }

        out.push_str("\n[Service]\n");
        out.push_str("Type=simple\n");

        out.push_str("WorkingDirectory=");
        out.push_str(&util::escape_specifiers(&working_directory));
        out.push('\n');

        if let Some(u) = user {
            out.push_str("User=");
            out.push_str(&util::escape_specifiers(&u));
            out.push('\n');
        }
        if let Some(g) = group {
            out.push_str("Group=");
            out.push_str(&util::escape_specifiers(&g));
            out.push('\n');
        }

        for (k, v) in &self.environment {
            let assignment = format!("{k}={v}");
            out.push_str("Environment=");
            out.push_str(&util::quote_systemd_value(&assignment));
            out.push('\n');
        }

        out.push_str("ExecStart=");
        out.push_str(&util::render_systemd_exec(&exec_start)?);
        out.push('\n');

        out.push_str("Restart=");
        out.push_str(self.restart.as_str());
        out.push('\n');
        out.push_str("RestartSec=");
        out.push_str(&self.restart_delay_seconds.to_string());
        out.push('\n');

        if !wanted_by.is_empty() {
            out.push_str("\n[Install]\n");
            out.push_str("WantedBy=");
            out.push_str(&wanted_by.join(" "));
            out.push('\n');
        }

        Ok(out)
    }
}

fn normalize_opt_line(context: &'static str, input: Option<&str>) -> Result<Option<String>> {
    let Some(s) = input else {
        return Ok(None);
    };
    util::validate_no_control(context, s)?;
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if s.contains(char::is_whitespace) {
        return Err(Error::invalid_input(format!(
            "{context} must not contain whitespace"
        )));
    }
    Ok(Some(s.to_string()))
}

fn normalize_targets(context: &'static str, input: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut out = input
        .iter()
        .map(|item| util::canonicalize_target_name(context, item))
        .collect::<Result<Vec<_>>>()?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn normalize_abs_path(context: &'static str, input: &str) -> Result<String> {
    util::validate_no_control(context, input)?;
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::invalid_input(format!("{context} must not be empty")));
    }
    if !Path::new(s).is_absolute() {
        return Err(Error::invalid_input(format!(
            "{context} must be an absolute path (got {s:?})"
        )));
    }
    Ok(s.to_string())
}

fn normalize_argv(context: &'static str, argv: &[String]) -> Result<Vec<String>> {
    let Some(program) = argv.first() else {
        return Err(Error::invalid_input(format!("{context} must not be empty")));
    };
    for arg in argv {
        util::validate_no_control("exec argv", arg)
            .map_err(|e| Error::invalid_input(format!("{context}: {e}")))?;
    }
    let program = normalize_abs_path("exec_start[0]", program)?;

    let mut out = Vec::with_capacity(argv.len());
    out.push(program);
    out.extend(argv.iter().skip(1).cloned());
    Ok(out)
}
