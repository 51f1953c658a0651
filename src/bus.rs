use crate::{Error, Result};

use std::time::Duration;

pub(crate) const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
pub(crate) const SYSTEMD_MANAGER_PATH: &str = "/org/freedesktop/systemd1";
pub(crate) const SYSTEMD_MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

pub(crate) type EnableReply = (bool, Vec<(String, String, String)>);

/// Connection to the system bus, scoped to the systemd manager object.
#[derive(Debug)]
pub(crate) struct Bus {
    conn: zbus::Connection,
    dbus_call_timeout: Duration,
}

impl Bus {
    pub(crate) async fn connect_system(dbus_call_timeout: Duration) -> Result<Self> {
        let conn = zbus::connection::Builder::system()
            .map_err(|e| Error::manager_unavailable("connect_system_bus", e.to_string()))?
            .method_timeout(dbus_call_timeout)
            .build()
            .await
            .map_err(|e| Error::manager_unavailable("connect_system_bus", e.to_string()))?;
        Ok(Self {
            conn,
            dbus_call_timeout,
        })
    }

    async fn manager_proxy(&self, action: &'static str) -> Result<zbus::Proxy<'_>> {
        zbus::Proxy::new(
            &self.conn,
            SYSTEMD_DESTINATION,
            SYSTEMD_MANAGER_PATH,
            SYSTEMD_MANAGER_INTERFACE,
        )
        .await
        .map_err(|e| map_zbus_method_error(action, self.dbus_call_timeout, e, None))
    }

    pub(crate) async fn daemon_reload(&self) -> Result<()> {
        let proxy = self.manager_proxy("daemon_reload").await?;
        proxy
            .call::<_, _, ()>("Reload", &())
            .await
            .map_err(|e| map_zbus_method_error("daemon_reload", self.dbus_call_timeout, e, None))
    }

    pub(crate) async fn enable_unit_files(
        &self,
        units: &[&str],
        runtime: bool,
        force: bool,
    ) -> Result<EnableReply> {
        let proxy = self.manager_proxy("enable_unit_files").await?;
        proxy
            .call("EnableUnitFiles", &(units, runtime, force))
            .await
            .map_err(|e| {
                map_zbus_method_error(
                    "enable_unit_files",
                    self.dbus_call_timeout,
                    e,
                    units.first().copied(),
                )
            })
    }
}

fn map_zbus_method_error(
    action: &'static str,
    timeout: Duration,
    err: zbus::Error,
    unit: Option<&str>,
) -> Error {
    match &err {
        zbus::Error::MethodError(name, detail, _reply) => {
            let name = name.to_string();
            let message = detail.clone().unwrap_or_default();

            if (name.contains("NoSuchUnit")
                || name.contains("UnknownUnit")
                || name.contains("FileNotFound"))
                && let Some(unit) = unit
            {
                return Error::UnitNotFound {
                    unit: unit.to_string(),
                };
            }

            if name.contains("AccessDenied")
                || name.contains("PermissionDenied")
                || name.contains("PolicyKit")
                || name.contains("InteractiveAuthorizationRequired")
            {
                return Error::manager_unavailable(
                    action,
                    format!("access denied by the service manager: {name}: {message}"),
                );
            }

            Error::manager_unavailable(action, format!("{name}: {message}"))
        }
        zbus::Error::InputOutput(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            Error::manager_timeout(action, timeout)
        }
        _ => Error::manager_unavailable(action, err.to_string()),
    }
}
