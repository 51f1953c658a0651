use crate::bus::Bus;
use crate::types::report::{EnableReport, UnitFileChange};
use crate::Result;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

/// Control interface of the host service manager.
///
/// Both calls block until the manager answers or the implementation's timeout expires.
pub trait ServiceManager {
    /// Reload the unit database so new or changed unit files are observed.
    fn reload(&self) -> impl Future<Output = Result<()>>;

    /// Enable `unit` for the boot targets named in its `[Install]` section.
    fn enable(&self, unit: &str) -> impl Future<Output = Result<EnableReport>>;
}

/// systemd over the system D-Bus.
///
/// The bus connection is opened on first use, so rendering and writing work without one.
#[derive(Debug)]
pub struct Systemd {
    timeout: Duration,
    bus: OnceLock<Bus>,
}

impl Systemd {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            bus: OnceLock::new(),
        }
    }

    async fn bus(&self) -> Result<&Bus> {
        if let Some(bus) = self.bus.get() {
            return Ok(bus);
        }
        let bus = Bus::connect_system(self.timeout).await?;
        Ok(self.bus.get_or_init(|| bus))
    }
}

impl ServiceManager for Systemd {
    async fn reload(&self) -> Result<()> {
        self.bus().await?.daemon_reload().await
    }

    async fn enable(&self, unit: &str) -> Result<EnableReport> {
        let (carries_install_info, changes) = self
            .bus()
            .await?
            .enable_unit_files(&[unit], false, false)
            .await?;
        Ok(EnableReport {
            carries_install_info,
            changes: changes.into_iter().map(UnitFileChange::from_dbus).collect(),
        })
    }
}
