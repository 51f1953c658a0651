use crate::elevation::{Elevation, ProcessPrivileges};
use crate::manager::{ServiceManager, Systemd};
use crate::types::descriptor::ServiceDescriptor;
use crate::types::report::{EnableReport, InstallReport, Stage, WriteReport};
use crate::{Error, InstallFailure, InstallerOptions, Result, fsutil, util};

use std::path::{Path, PathBuf};

/// Installs one service unit: render, write, reload the manager, enable.
#[derive(Debug)]
pub struct Installer<M = Systemd, E = ProcessPrivileges> {
    opts: InstallerOptions,
    manager: M,
    elevation: E,
}

impl Installer {
    /// Installer backed by systemd on the system bus and the current process credentials.
    pub fn system(opts: InstallerOptions) -> Self {
        let manager = Systemd::new(opts.manager_timeout);
        Self::with_parts(opts, manager, ProcessPrivileges)
    }
}

impl<M: ServiceManager, E: Elevation> Installer<M, E> {
    pub fn with_parts(opts: InstallerOptions, manager: M, elevation: E) -> Self {
        Self {
            opts,
            manager,
            elevation,
        }
    }

    pub fn options(&self) -> &InstallerOptions {
        &self.opts
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Render the unit file text without touching the filesystem.
    pub fn render(&self, descriptor: &ServiceDescriptor) -> Result<String> {
        descriptor.render()
    }

    /// Write `<target_dir>/<name>.service` with mode 0644 under a scoped elevation.
    ///
    /// Validation happens before elevation is requested; the guard is dropped on every path out.
    pub async fn install(
        &self,
        descriptor: &ServiceDescriptor,
        target_dir: &Path,
    ) -> Result<WriteReport> {
        let contents = descriptor.render()?;
        let unit = descriptor.unit_name()?;
        self.write(unit, contents, target_dir).await
    }

    async fn write(&self, unit: String, contents: String, target_dir: &Path) -> Result<WriteReport> {
        #[cfg(feature = "tracing")]
        tracing::info!(%unit, target_dir = %target_dir.display(), "install unit file");

        let _guard = self.elevation.acquire(target_dir)?;

        let dir = target_dir.to_path_buf();
        let overwrite = self.opts.overwrite;
        let report = blocking::unblock(move || {
            fsutil::write_unit_file(&dir, &unit, &contents, overwrite)
        })
        .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            path = %report.path_written,
            changed = report.changed,
            "install unit file done"
        );

        Ok(report)
    }

    /// Ask the service manager to reload its unit database.
    pub async fn reload_manager(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!("daemon_reload");
        self.manager.reload().await
    }

    /// Enable a unit previously installed into `InstallerOptions::systemd_system_dir`.
    pub async fn enable(&self, name: &str) -> Result<EnableReport> {
        let dir = PathBuf::from(&self.opts.systemd_system_dir);
        self.enable_in(name, &dir).await
    }

    async fn enable_in(&self, name: &str, target_dir: &Path) -> Result<EnableReport> {
        let unit = util::canonicalize_unit_name(name)?;
        if !fsutil::unit_file_exists(target_dir, &unit) {
            return Err(Error::UnitNotFound { unit });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(%unit, "enable unit");

        let report = self.manager.enable(&unit).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            %unit,
            changes = report.changes.len(),
            carries_install_info = report.carries_install_info,
            "enable unit done"
        );

        Ok(report)
    }

    /// Run render, install, reload and enable in order, stopping at the first failure.
    ///
    /// A unit file written before a later stage fails is left in place; the failure reports
    /// whether it is on disk. Render and install failures never report a file, since any file at
    /// the target path at that point was not written by this run.
    pub async fn install_and_enable(
        &self,
        descriptor: &ServiceDescriptor,
        target_dir: &Path,
    ) -> std::result::Result<InstallReport, InstallFailure> {
        let unit = descriptor.unit_name().unwrap_or_default();
        let fail = |stage: Stage, source: Error, written: bool| {
            let path = (!unit.is_empty()).then(|| fsutil::unit_file_path(target_dir, &unit));
            let file_left_on_disk = written && path.as_ref().is_some_and(|p| p.is_file());

            #[cfg(feature = "tracing")]
            tracing::warn!(%stage, error = %source, file_left_on_disk, "install pipeline aborted");

            InstallFailure {
                stage,
                source,
                unit: unit.clone(),
                path: path.map(|p| p.to_string_lossy().into_owned()),
                file_left_on_disk,
            }
        };

        let contents = descriptor
            .render()
            .map_err(|e| fail(Stage::Render, e, false))?;

        let wrote = self
            .write(unit.clone(), contents, target_dir)
            .await
            .map_err(|e| fail(Stage::Install, e, false))?;

        self.reload_manager()
            .await
            .map_err(|e| fail(Stage::Reload, e, true))?;

        let enabled = self
            .enable_in(&unit, target_dir)
            .await
            .map_err(|e| fail(Stage::Enable, e, true))?;

        Ok(InstallReport {
            unit: unit.clone(),
            wrote,
            enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::elevation::ElevationGuard;
    use crate::types::descriptor::RestartPolicy;
    use crate::types::report::UnitFileChange;
    use crate::OverwritePolicy;

    use std::cell::{Cell, RefCell};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut dir = std::env::temp_dir();
        dir.push(format!("unitinstall-{name}-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    /// In-memory manager: records calls and keeps enablement as a set of symlinks.
    #[derive(Default)]
    struct FakeManager {
        reload_calls: Cell<usize>,
        enable_calls: Cell<usize>,
        fail_reload: bool,
        fail_enable: bool,
        links: RefCell<BTreeSet<String>>,
    }

    impl ServiceManager for FakeManager {
        async fn reload(&self) -> Result<()> {
            self.reload_calls.set(self.reload_calls.get() + 1);
            if self.fail_reload {
                return Err(Error::manager_unavailable("daemon_reload", "bus down"));
            }
            Ok(())
        }

        async fn enable(&self, unit: &str) -> Result<EnableReport> {
            self.enable_calls.set(self.enable_calls.get() + 1);
            if self.fail_enable {
                return Err(Error::manager_unavailable("enable_unit_files", "bus down"));
            }
            let link = format!("/etc/systemd/system/multi-user.target.wants/{unit}");
            let mut changes = Vec::new();
            if self.links.borrow_mut().insert(link.clone()) {
                changes.push(UnitFileChange::from_dbus((
                    "symlink".to_string(),
                    link,
                    format!("/etc/systemd/system/{unit}"),
                )));
            }
            Ok(EnableReport {
                carries_install_info: true,
                changes,
            })
        }
    }

    #[derive(Clone, Default)]
    struct FakeElevation {
        deny: bool,
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl Elevation for FakeElevation {
        fn acquire(&self, scope: &Path) -> Result<ElevationGuard> {
            if self.deny {
                return Err(Error::PermissionDenied {
                    action: "elevate",
                    detail: "sudo: a password is required".to_string(),
                });
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            let released = self.released.clone();
            Ok(ElevationGuard::with_release(scope, move || {
                released.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    fn sample_api() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "sample-api".to_string(),
            description: "Sample API".to_string(),
            exec_start: vec![
                "/usr/bin/python3".to_string(),
                "/srv/app/main.py".to_string(),
            ],
            working_directory: "/srv/app".to_string(),
            user: Some("svc".to_string()),
            group: Some("svc".to_string()),
            environment: BTreeMap::new(),
            restart: RestartPolicy::OnFailure,
            restart_delay_seconds: 10,
            after: BTreeSet::new(),
            wanted_by: BTreeSet::from(["multi-user".to_string()]),
        }
    }

    fn installer(
        dir: &Path,
        manager: FakeManager,
        elevation: FakeElevation,
    ) -> Installer<FakeManager, FakeElevation> {
        let mut opts = InstallerOptions::default();
        opts.systemd_system_dir = dir.to_string_lossy().into_owned();
        Installer::with_parts(opts, manager, elevation)
    }

    #[test]
    fn sample_api_pipeline_succeeds() {
        let dir = temp_dir("pipeline-ok");
        let elevation = FakeElevation::default();
        let inst = installer(&dir, FakeManager::default(), elevation.clone());

        let report = smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect("ok");
        assert_eq!(report.unit, "sample-api.service");
        assert!(report.wrote.changed);
        assert_eq!(report.enabled.changes.len(), 1);

        let text = std::fs::read_to_string(dir.join("sample-api.service")).expect("read");
        assert!(text.contains("ExecStart=/usr/bin/python3 /srv/app/main.py\n"));
        assert!(text.contains("WantedBy=multi-user.target\n"));

        assert_eq!(inst.manager().reload_calls.get(), 1);
        assert_eq!(inst.manager().enable_calls.get(), 1);
        assert_eq!(elevation.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(elevation.released.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reinstall_is_idempotent() {
        let dir = temp_dir("pipeline-twice");
        let inst = installer(&dir, FakeManager::default(), FakeElevation::default());

        let first = smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect("ok");
        let before = std::fs::read(dir.join("sample-api.service")).expect("read");
        let second = smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect("ok");
        let after = std::fs::read(dir.join("sample-api.service")).expect("read");

        assert_eq!(before, after);
        assert!(first.wrote.changed);
        assert!(!second.wrote.changed);
        assert!(second.enabled.changes.is_empty());
        assert_eq!(inst.manager().links.borrow().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn relative_workdir_fails_at_render_without_writing() {
        let dir = temp_dir("pipeline-invalid");
        let elevation = FakeElevation::default();
        let inst = installer(&dir, FakeManager::default(), elevation.clone());

        let mut d = sample_api();
        d.working_directory = "relative/path".to_string();

        let failure =
            smol::block_on(inst.install_and_enable(&d, &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Render);
        assert_eq!(failure.exit_code(), 1);
        assert!(!failure.file_left_on_disk);
        assert!(!dir.join("sample-api.service").exists());
        assert_eq!(elevation.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(inst.manager().reload_calls.get(), 0);

        let err = smol::block_on(inst.install(&d, &dir)).expect_err("must fail");
        let Error::InvalidInput { .. } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(!dir.join("sample-api.service").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn reload_failure_skips_enable_and_reports_file() {
        let dir = temp_dir("pipeline-reload");
        let manager = FakeManager {
            fail_reload: true,
            ..Default::default()
        };
        let inst = installer(&dir, manager, FakeElevation::default());

        let failure =
            smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Reload);
        assert_eq!(failure.exit_code(), 4);
        assert!(failure.file_left_on_disk);
        assert_eq!(inst.manager().reload_calls.get(), 1);
        assert_eq!(inst.manager().enable_calls.get(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn enable_failure_is_reported_as_enable_stage() {
        let dir = temp_dir("pipeline-enable");
        let manager = FakeManager {
            fail_enable: true,
            ..Default::default()
        };
        let inst = installer(&dir, manager, FakeElevation::default());

        let failure =
            smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Enable);
        assert!(failure.file_left_on_disk);
        let expected = dir.join("sample-api.service").to_string_lossy().into_owned();
        assert_eq!(failure.path.as_deref(), Some(expected.as_str()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn denied_elevation_is_permission_error_and_writes_nothing() {
        let dir = temp_dir("pipeline-denied");
        let elevation = FakeElevation {
            deny: true,
            ..Default::default()
        };
        let inst = installer(&dir, FakeManager::default(), elevation);

        let failure =
            smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Install);
        assert_eq!(failure.exit_code(), 2);
        assert!(!failure.file_left_on_disk);
        assert_eq!(inst.manager().reload_calls.get(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn render_failure_never_claims_an_existing_file() {
        let dir = temp_dir("pipeline-render-existing");
        std::fs::write(dir.join("sample-api.service"), "operator's own unit\n").expect("seed");
        let inst = installer(&dir, FakeManager::default(), FakeElevation::default());

        let mut descriptor = sample_api();
        descriptor.working_directory = "relative/path".to_string();
        let failure =
            smol::block_on(inst.install_and_enable(&descriptor, &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Render);
        assert!(!failure.file_left_on_disk);
        assert_eq!(
            std::fs::read_to_string(dir.join("sample-api.service")).expect("read"),
            "operator's own unit\n"
        );

        let denied = installer(
            &dir,
            FakeManager::default(),
            FakeElevation {
                deny: true,
                ..Default::default()
            },
        );
        let failure =
            smol::block_on(denied.install_and_enable(&sample_api(), &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Install);
        assert!(!failure.file_left_on_disk);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn elevation_is_released_when_write_fails() {
        let dir = temp_dir("pipeline-refuse");
        std::fs::write(dir.join("sample-api.service"), "hand edited\n").expect("seed");

        let elevation = FakeElevation::default();
        let mut opts = InstallerOptions::default();
        opts.systemd_system_dir = dir.to_string_lossy().into_owned();
        opts.overwrite = OverwritePolicy::Refuse;
        let inst = Installer::with_parts(opts, FakeManager::default(), elevation.clone());

        let failure =
            smol::block_on(inst.install_and_enable(&sample_api(), &dir)).expect_err("must fail");
        assert_eq!(failure.stage, Stage::Install);
        assert_eq!(failure.exit_code(), 3);
        let Error::AlreadyExists { .. } = failure.source else {
            panic!("unexpected error: {:?}", failure.source);
        };
        assert!(!failure.file_left_on_disk);
        assert_eq!(
            std::fs::read_to_string(dir.join("sample-api.service")).expect("read"),
            "hand edited\n"
        );
        assert_eq!(elevation.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(elevation.released.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn enable_without_install_is_unit_not_found() {
        let dir = temp_dir("enable-missing");
        let inst = installer(&dir, FakeManager::default(), FakeElevation::default());

        let err = smol::block_on(inst.enable("sample-api")).expect_err("must fail");
        let Error::UnitNotFound { unit } = err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(unit, "sample-api.service");
        assert_eq!(inst.manager().enable_calls.get(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stages_can_be_driven_one_by_one() {
        let dir = temp_dir("stages");
        let inst = installer(&dir, FakeManager::default(), FakeElevation::default());
        let d = sample_api();

        let rendered = inst.render(&d).expect("render ok");
        let wrote = smol::block_on(inst.install(&d, &dir)).expect("install ok");
        assert_eq!(
            std::fs::read_to_string(&wrote.path_written).expect("read"),
            rendered
        );
        smol::block_on(inst.reload_manager()).expect("reload ok");
        let enabled = smol::block_on(inst.enable("sample-api")).expect("enable ok");
        assert!(enabled.carries_install_info);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
