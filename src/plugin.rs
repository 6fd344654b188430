//! PiVoyager UPS plugin: lifecycle hooks called by the host agent
//!
//! Requires the vendor `pivoyager` binary (default /usr/local/bin/pivoyager)
//! and I2C enabled on the board.

use crate::config::Config;
use crate::device::{Device, PiVoyagerCli};
use crate::error::{Error, Result};
use crate::host::{Host, SystemHost};
use crate::monitor::{spawn_supervisor, MonitorHandle, Supervisor, SupervisorExit, SupervisorSettings};
use crate::status::{BatteryMode, StatusRecord};
use crate::ui::{Font, LabeledValue, Ui};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Key of the display element owned by this plugin
pub const ELEMENT: &str = "pivoyager";

pub fn battery_glyph(mode: &BatteryMode) -> Result<&'static str> {
    match mode {
        BatteryMode::Charging => Ok("\u{25AA}"),
        BatteryMode::Discharging => Ok("\u{25AB}"),
        BatteryMode::Other(mode) => Err(Error::UnknownBatteryMode(mode.clone())),
    }
}

/// `<glyph><voltage>`, e.g. `▫3.95`
pub fn render_battery(record: &StatusRecord) -> Result<String> {
    let glyph = battery_glyph(&record.battery_mode)?;
    Ok(format!("{}{}", glyph, record.battery_voltage))
}

pub struct PiVoyagerPlugin {
    config: Config,
    device: Arc<dyn Device>,
    host: Arc<dyn Host>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl PiVoyagerPlugin {
    pub fn new(config: Config, device: Arc<dyn Device>, host: Arc<dyn Host>) -> Self {
        Self {
            config,
            device,
            host,
            monitor: Mutex::new(None),
        }
    }

    /// Plugin talking to the real board and the local system
    pub fn from_config(config: Config) -> Self {
        let device = Arc::new(PiVoyagerCli::new(&config.path));
        Self::new(config, device, Arc::new(SystemHost))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fresh status reading
    pub async fn status(&self) -> Result<StatusRecord> {
        self.device.status().await
    }

    pub async fn monitor_running(&self) -> bool {
        match self.monitor.lock().await.as_ref() {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    /// Start the supervisor, then sync the host clock from the RTC.
    ///
    /// The supervisor is cancelled together with `cancel`.
    pub async fn on_loaded(&self, cancel: &CancellationToken) -> Result<()> {
        {
            let mut monitor = self.monitor.lock().await;
            if let Some(previous) = monitor.take() {
                tracing::warn!("pivoyager plugin loaded twice, restarting supervisor");
                previous.stop().await;
            }
            let supervisor = Supervisor::new(
                self.device.clone(),
                self.host.clone(),
                SupervisorSettings::from(&self.config),
            );
            *monitor = Some(spawn_supervisor(supervisor, cancel.child_token()));
        }

        // Sync internal clock to RTC
        let status = self.device.status().await?;
        if status.rtc_initialized() {
            let date = self.device.date().await?;
            self.host.set_clock(&date).await?;
            tracing::info!("updated local time");
        } else {
            tracing::warn!("could not sync local time due to uninitialised RTC");
        }

        tracing::info!("pivoyager ups plugin loaded");
        Ok(())
    }

    pub fn on_ui_setup(&self, ui: &mut dyn Ui) {
        let position = (ui.width() / 2, 0);
        ui.add_element(
            ELEMENT,
            LabeledValue {
                label: "UPS".to_string(),
                value: String::new(),
                position,
                label_font: Font::Bold,
                text_font: Font::Medium,
            },
        );
    }

    /// Fresh reading rendered as the display text
    pub async fn battery_display(&self) -> Result<String> {
        let status = self.device.status().await?;
        render_battery(&status)
    }

    /// Query and draw the battery state. An unknown battery mode leaves the
    /// element untouched and returns an error.
    ///
    /// `ui` is write-locked only for the final `set`, never across the query.
    pub async fn on_ui_update<U: Ui>(&self, ui: &RwLock<U>) -> Result<()> {
        let text = self.battery_display().await?;
        if !ui.write().await.set(ELEMENT, text) {
            tracing::debug!("{} element not set up, skipping update", ELEMENT);
        }
        Ok(())
    }

    /// Set the RTC from the (now NTP-synced) host clock if the RTC was never
    /// initialised. Returns whether a sync was issued.
    pub async fn on_internet_available(&self) -> Result<bool> {
        let status = self.device.status().await?;
        if status.rtc_initialized() {
            return Ok(false);
        }
        self.device.sync_rtc().await?;
        tracing::info!("updated pivoyager rtc");
        Ok(true)
    }

    /// Stop the supervisor and wait for it
    pub async fn on_unload(&self) -> Option<SupervisorExit> {
        let handle = self.monitor.lock().await.take()?;
        let exit = handle.stop().await;
        tracing::info!("pivoyager ups plugin unloaded");
        exit
    }
}
