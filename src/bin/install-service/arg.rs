use clap::{ArgAction, Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;

use unitinstall::RestartPolicy;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restart {
    Never,
    OnFailure,
    Always,
}

impl From<Restart> for RestartPolicy {
    fn from(r: Restart) -> Self {
        match r {
            Restart::Never => RestartPolicy::Never,
            Restart::OnFailure => RestartPolicy::OnFailure,
            Restart::Always => RestartPolicy::Always,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "install-service",
    version = env!("CARGO_PKG_VERSION"),
    about = "Install a systemd service unit, reload systemd and enable it at boot"
)]
pub struct Cli {
    /// Unit name (`sample-api` or `sample-api.service`)
    #[arg(long)]
    pub name: String,
    /// Absolute path of the program to run
    #[arg(long = "exec")]
    pub exec: String,
    /// Argument passed to the program (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Absolute working directory
    #[arg(long)]
    pub workdir: String,
    #[arg(long)]
    pub user: String,
    #[arg(long)]
    pub group: String,
    /// KEY=VALUE environment entry (repeatable)
    #[arg(long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,
    #[arg(long, value_enum, default_value_t = Restart::Always)]
    pub restart: Restart,
    /// Seconds to wait before restarting
    #[arg(long = "restart-delay", default_value_t = 5, allow_negative_numbers = true)]
    pub restart_delay: i64,
    /// Ordering dependency (repeatable, default: network.target)
    #[arg(long = "after")]
    pub after: Vec<String>,
    /// Boot target that pulls the unit in (repeatable, default: multi-user.target)
    #[arg(long = "wanted-by")]
    pub wanted_by: Vec<String>,
    #[arg(long = "target-dir", default_value = "/etc/systemd/system")]
    pub target_dir: PathBuf,
    /// Description (default: "<name> service")
    #[arg(long)]
    pub description: Option<String>,
    /// Refuse to replace an existing unit file with different content
    #[arg(long = "no-clobber")]
    pub no_clobber: bool,
    /// Print the rendered unit and exit without installing
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,
    /// Timeout for service manager calls, in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
    /// More logging (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// `--env` entries keyed by name; a key given twice is an error.
    pub fn environment(&self) -> Result<BTreeMap<String, String>, String> {
        let mut out = BTreeMap::new();
        for (k, v) in &self.env {
            if out.insert(k.clone(), v.clone()).is_some() {
                return Err(format!("duplicate --env key {k:?}"));
            }
        }
        Ok(out)
    }
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    let Some((k, v)) = s.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got {s:?}"));
    };
    if k.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((k.to_string(), v.to_string()))
}
