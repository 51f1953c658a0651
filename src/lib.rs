//! unitinstall installs a single systemd service unit: it renders the unit file from a typed
//! descriptor, writes it into the system unit directory under a scoped privilege check, reloads
//! systemd and enables the unit for boot.
//!
//! It is an installation helper, not a supervisor: once the unit is enabled, systemd owns it.
//!
//! Runtime is Linux-only (systemd + system bus required). Rendering works anywhere.
//!
//! ## Quick start
//! ```no_run
//! use std::path::Path;
//! use unitinstall::{Installer, InstallerOptions, RestartPolicy, ServiceDescriptor};
//!
//! async fn install_api() -> Result<(), unitinstall::InstallFailure> {
//!     let mut d = ServiceDescriptor::default();
//!     d.name = "sample-api".to_string();
//!     d.exec_start = vec!["/usr/bin/python3".to_string(), "/srv/app/main.py".to_string()];
//!     d.working_directory = "/srv/app".to_string();
//!     d.restart = RestartPolicy::OnFailure;
//!     d.restart_delay_seconds = 10;
//!     d.wanted_by.insert("multi-user".to_string());
//!
//!     let installer = Installer::system(InstallerOptions::default());
//!     let report = installer
//!         .install_and_enable(&d, Path::new("/etc/systemd/system"))
//!         .await?;
//!     println!("installed {}", report.unit);
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//! `install_and_enable` runs render, install, reload and enable in that order and stops at the
//! first failure. Nothing is rolled back: `InstallFailure` names the stage and whether the unit
//! file was left on disk.
//!
//! ## Unit name rules
//! - Pass either `"nginx.service"` or the shorthand `"nginx"` (canonicalized to
//!   `"nginx.service"`).
//! - Names with path separators, `..`, whitespace or control characters are rejected as
//!   `Error::InvalidInput`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::dbg_macro)]

#[cfg(all(feature = "rt-async-io", feature = "rt-tokio"))]
compile_error!("features `rt-async-io` and `rt-tokio` are mutually exclusive; enable exactly one.");

#[cfg(not(any(feature = "rt-async-io", feature = "rt-tokio")))]
compile_error!(
    "missing runtime feature: enable one of `rt-async-io` or `rt-tokio` (default enables `rt-async-io`)."
);

mod blocking_api;
mod bus;
mod elevation;
mod error;
mod fsutil;
mod installer;
mod manager;
mod options;
mod runtime;
mod types;
mod util;

pub use crate::types::descriptor::{RestartPolicy, ServiceDescriptor};
pub use crate::types::report::{
    EnableReport, InstallReport, Stage, UnitFileChange, WriteReport,
};

pub use crate::blocking_api::BlockingInstaller;
pub use crate::elevation::{Elevation, ElevationGuard, ProcessPrivileges};
pub use crate::error::{Error, InstallFailure, Result};
pub use crate::installer::Installer;
pub use crate::manager::{ServiceManager, Systemd};
pub use crate::options::{InstallerOptions, OverwritePolicy};
