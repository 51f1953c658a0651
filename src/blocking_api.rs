use crate::elevation::{Elevation, ProcessPrivileges};
use crate::manager::{ServiceManager, Systemd};
use crate::types::report::Stage;
use crate::{
    EnableReport, InstallFailure, InstallReport, Installer, InstallerOptions, Result,
    ServiceDescriptor, WriteReport,
};

use std::path::Path;

/// Blocking wrapper for `Installer`.
///
/// Internally it uses the selected runtime (`rt-async-io` or `rt-tokio`) to drive the async
/// implementation. This is what the `install-service` binary uses.
#[derive(Debug)]
pub struct BlockingInstaller<M = Systemd, E = ProcessPrivileges> {
    inner: Installer<M, E>,
}

impl BlockingInstaller {
    /// Installer backed by systemd on the system bus (blocking).
    pub fn system(opts: InstallerOptions) -> Self {
        Self {
            inner: Installer::system(opts),
        }
    }
}

impl<M: ServiceManager, E: Elevation> BlockingInstaller<M, E> {
    pub fn new(inner: Installer<M, E>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Installer<M, E> {
        &self.inner
    }

    pub fn render(&self, descriptor: &ServiceDescriptor) -> Result<String> {
        self.inner.render(descriptor)
    }

    pub fn install(&self, descriptor: &ServiceDescriptor, target_dir: &Path) -> Result<WriteReport> {
        crate::runtime::block_on_result(self.inner.install(descriptor, target_dir))
    }

    pub fn reload_manager(&self) -> Result<()> {
        crate::runtime::block_on_result(self.inner.reload_manager())
    }

    pub fn enable(&self, name: &str) -> Result<EnableReport> {
        crate::runtime::block_on_result(self.inner.enable(name))
    }

    pub fn install_and_enable(
        &self,
        descriptor: &ServiceDescriptor,
        target_dir: &Path,
    ) -> std::result::Result<InstallReport, InstallFailure> {
        match crate::runtime::block_on(self.inner.install_and_enable(descriptor, target_dir)) {
            Ok(outcome) => outcome,
            // The runtime could not start, so no stage ran.
            Err(source) => Err(InstallFailure {
                stage: Stage::Render,
                source,
                unit: descriptor.unit_name().unwrap_or_default(),
                path: None,
                file_left_on_disk: false,
            }),
        }
    }
}
