//! Background supervisor: polls the UPS and powers the host off on low
//! battery or a button press

use crate::config::{Config, QueryErrorPolicy};
use crate::device::Device;
use crate::error::Result;
use crate::host::Host;
use crate::status::{Flag, Flags};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What one status reading asks the supervisor to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Continue,
    BatteryLow,
    ButtonPressed,
}

/// Map charger and button flags to a decision.
///
/// Low battery (no external power, stat1 clear, stat2 set) is checked first
/// and wins over a simultaneous button press.
pub fn decide(flags: &Flags) -> Decision {
    if !flags.contains(Flag::PowerGood) && !flags.contains(Flag::Stat1) && flags.contains(Flag::Stat2) {
        Decision::BatteryLow
    } else if flags.contains(Flag::Button) {
        Decision::ButtonPressed
    } else {
        Decision::Continue
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorExit {
    BatteryLow,
    ButtonPressed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub refresh: Duration,
    pub watchdog_timeout: u64,
    pub query_errors: QueryErrorPolicy,
    pub max_query_failures: u32,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            refresh: config.refresh_interval(),
            watchdog_timeout: config.watchdog_timeout,
            query_errors: config.query_errors,
            max_query_failures: config.max_query_failures,
        }
    }
}

pub struct Supervisor {
    device: Arc<dyn Device>,
    host: Arc<dyn Host>,
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(device: Arc<dyn Device>, host: Arc<dyn Host>, settings: SupervisorSettings) -> Self {
        Self {
            device,
            host,
            settings,
        }
    }

    /// Poll until a terminal condition, a fatal query error or cancellation.
    ///
    /// The host is shut down exactly once after a terminal condition and never
    /// on cancellation or error. Those two paths disarm the watchdog instead.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SupervisorExit> {
        let exit = match self.poll(&cancel).await {
            Ok(SupervisorExit::Cancelled) => {
                self.disarm_watchdog().await;
                return Ok(SupervisorExit::Cancelled);
            }
            Ok(exit) => exit,
            Err(e) => {
                self.disarm_watchdog().await;
                return Err(e);
            }
        };

        self.host.shutdown().await?;
        Ok(exit)
    }

    async fn disarm_watchdog(&self) {
        match self.device.disarm_watchdog().await {
            Ok(()) => tracing::info!("Watchdog disarmed"),
            Err(e) => tracing::error!("Failed to disarm watchdog: {}", e),
        }
    }

    async fn poll(&self, cancel: &CancellationToken) -> Result<SupervisorExit> {
        let mut armed = false;
        let mut failures: u32 = 0;
        loop {
            if !armed {
                // Cut off power after `watchdog_timeout` seconds of inactivity
                match self.device.arm_watchdog(self.settings.watchdog_timeout).await {
                    Ok(()) => armed = true,
                    Err(e) if self.settings.query_errors == QueryErrorPolicy::Stop => return Err(e),
                    Err(e) => tracing::error!("Failed to arm watchdog, retrying on next poll: {}", e),
                }
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SupervisorExit::Cancelled),
                status = self.device.status() => status,
            };

            match status {
                Ok(record) => {
                    failures = 0;
                    match decide(&record.flags) {
                        Decision::BatteryLow => {
                            tracing::warn!("Battery low! Shutting down");
                            return Ok(SupervisorExit::BatteryLow);
                        }
                        Decision::ButtonPressed => {
                            if let Err(e) = self.device.clear_button().await {
                                tracing::error!("Failed to clear button flag: {}", e);
                            }
                            tracing::warn!("Button pressed! Shutting down");
                            return Ok(SupervisorExit::ButtonPressed);
                        }
                        Decision::Continue => {
                            tracing::debug!(
                                "UPS {} {} flags={:?}",
                                record.battery_mode,
                                record.battery_voltage,
                                record.flags.known
                            );
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    let give_up = match self.settings.query_errors {
                        QueryErrorPolicy::Stop => true,
                        QueryErrorPolicy::Retry => failures >= self.settings.max_query_failures,
                    };
                    if give_up {
                        return Err(e);
                    }
                    tracing::warn!(
                        "UPS status query failed ({}/{}): {}",
                        failures,
                        self.settings.max_query_failures,
                        e
                    );
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(SupervisorExit::Cancelled),
                _ = tokio::time::sleep(self.settings.refresh) => {}
            }
        }
    }
}

/// Running supervisor task
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<SupervisorExit>>,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the supervisor and wait for it to end
    pub async fn stop(self) -> Option<SupervisorExit> {
        self.cancel.cancel();
        match self.task.await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(_)) => None,
            Err(e) => {
                tracing::error!("Status supervisor task failed: {}", e);
                None
            }
        }
    }
}

/// Start the supervisor on the tokio runtime
pub fn spawn_supervisor(supervisor: Supervisor, cancel: CancellationToken) -> MonitorHandle {
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = supervisor.run(cancel).await;
            match &result {
                Ok(exit) => tracing::info!("Status supervisor finished: {:?}", exit),
                Err(e) => tracing::error!("Status supervisor stopped without shutting down: {}", e),
            }
            result
        }
    });

    MonitorHandle { cancel, task }
}
