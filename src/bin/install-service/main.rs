use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unitinstall::{
    BlockingInstaller, InstallFailure, InstallReport, InstallerOptions, OverwritePolicy,
    ServiceDescriptor, Stage,
};

mod arg;

fn main() -> ExitCode {
    let cli = match arg::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors are validation errors (exit 1); --help/--version are not errors.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose);

    let descriptor = match descriptor_from(&cli) {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("error: {} stage failed: invalid input: {msg}", Stage::Render);
            return ExitCode::from(1);
        }
    };

    let mut opts = InstallerOptions::default();
    opts.manager_timeout = Duration::from_secs(cli.timeout);
    opts.systemd_system_dir = cli.target_dir.to_string_lossy().into_owned();
    if cli.no_clobber {
        opts.overwrite = OverwritePolicy::Refuse;
    }
    let installer = BlockingInstaller::system(opts);

    if cli.dry_run {
        return match installer.render(&descriptor) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {} stage failed: {e}", Stage::Render);
                ExitCode::from(e.exit_code())
            }
        };
    }

    match installer.install_and_enable(&descriptor, &cli.target_dir) {
        Ok(report) => {
            print_success(&report);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            print_failure(&failure);
            ExitCode::from(failure.exit_code())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn descriptor_from(cli: &arg::Cli) -> Result<ServiceDescriptor, String> {
    let mut d = ServiceDescriptor::default();
    d.name = cli.name.clone();
    d.description = cli
        .description
        .clone()
        .unwrap_or_else(|| format!("{} service", cli.name.trim()));
    d.exec_start = std::iter::once(cli.exec.clone())
        .chain(cli.args.iter().cloned())
        .collect();
    d.working_directory = cli.workdir.clone();
    d.user = Some(cli.user.clone());
    d.group = Some(cli.group.clone());
    d.environment = cli.environment()?;
    d.restart = cli.restart.into();
    d.restart_delay_seconds = cli.restart_delay;
    d.after = if cli.after.is_empty() {
        ["network.target".to_string()].into()
    } else {
        cli.after.iter().cloned().collect()
    };
    d.wanted_by = if cli.wanted_by.is_empty() {
        ["multi-user.target".to_string()].into()
    } else {
        cli.wanted_by.iter().cloned().collect()
    };
    Ok(d)
}

fn print_success(report: &InstallReport) {
    println!(
        "installed {} ({})",
        report.unit, report.wrote.path_written
    );
    if !report.wrote.changed {
        println!("unit file was already up to date");
    }
    println!();
    println!("usage:");
    for hint in report.usage_hints() {
        println!("  {hint}");
    }
}

fn print_failure(failure: &InstallFailure) {
    eprintln!("error: {failure}");
    if let (true, Some(path)) = (failure.file_left_on_disk, failure.path.as_deref()) {
        eprintln!(
            "note: the unit file was left at {path}; remove it manually or re-run after fixing the {} stage",
            failure.stage
        );
    }
}
