//! Host primitives: power-off and system clock

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// What the monitor needs from the machine it runs on
#[async_trait]
pub trait Host: Send + Sync {
    /// Power the host off cleanly
    async fn shutdown(&self) -> Result<()>;

    /// Set the system clock from a date string understood by `date -s`
    async fn set_clock(&self, date: &str) -> Result<()>;
}

/// The local Linux system
#[derive(Debug, Default, Clone)]
pub struct SystemHost;

#[cfg(all(feature = "linux", target_os = "linux"))]
async fn logind_power_off() -> std::result::Result<(), String> {
    use zbus::Connection;
    use zbus_systemd::login1::ManagerProxy;

    let connection = Connection::system()
        .await
        .map_err(|e| format!("Failed to connect to system bus: {}", e))?;
    let manager = ManagerProxy::new(&connection)
        .await
        .map_err(|e| format!("Failed to create logind proxy: {}", e))?;
    manager
        .power_off(false)
        .await
        .map_err(|e| format!("Failed to power off: {}", e))
}

async fn shutdown_command() -> std::result::Result<(), String> {
    let status = Command::new("shutdown")
        .args(["-h", "now"])
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| format!("Failed to run shutdown: {}", e))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("shutdown exited with {}", status))
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn shutdown(&self) -> Result<()> {
        tracing::warn!("Powering off host");

        #[cfg(all(feature = "linux", target_os = "linux"))]
        {
            match logind_power_off().await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!("{}, falling back to shutdown command", e),
            }
        }

        shutdown_command().await.map_err(Error::Shutdown)
    }

    async fn set_clock(&self, date: &str) -> Result<()> {
        let output = Command::new("date")
            .args(["-s", date])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Clock(format!("failed to run date: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Clock(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}
