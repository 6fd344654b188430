//! MCP tool functions exposing the UPS to the host agent

use crate::connectivity;
use crate::monitor::{decide, Decision};
use crate::plugin::{render_battery, PiVoyagerPlugin, ELEMENT};
use crate::shared::{format_duration, internal_error, json_result};
use crate::status::StatusRecord;
use crate::ui::Canvas;
use rmcp::{model::*, ErrorData as McpError};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Serialize)]
pub struct UpsStatus {
    pub status: StatusRecord,
    pub decision: Decision,
    /// `None` when the battery mode has no glyph
    pub display: Option<String>,
}

impl From<StatusRecord> for UpsStatus {
    fn from(status: StatusRecord) -> Self {
        let decision = decide(&status.flags);
        let display = render_battery(&status).ok();
        Self {
            status,
            decision,
            display,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MonitorState {
    pub supervisor_running: bool,
    pub online: bool,
    pub binary: String,
    pub refresh: String,
    pub watchdog_timeout: String,
    pub query_errors: crate::config::QueryErrorPolicy,
    pub max_query_failures: u32,
}

// === Tool Functions ===

pub async fn get_ups_status(plugin: &PiVoyagerPlugin) -> Result<CallToolResult, McpError> {
    let status = plugin
        .status()
        .await
        .map_err(|e| internal_error(format!("Failed to query UPS: {}", e)))?;
    json_result(&UpsStatus::from(status))
}

pub async fn get_battery_display(canvas: &RwLock<Canvas>) -> Result<CallToolResult, McpError> {
    let canvas = canvas.read().await;
    let text = match canvas.get(ELEMENT) {
        Some(element) if !element.value.is_empty() => element.text(),
        Some(_) => "UPS display not drawn yet".to_string(),
        None => "UPS display element not set up".to_string(),
    };
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

pub async fn sync_rtc(plugin: &PiVoyagerPlugin) -> Result<CallToolResult, McpError> {
    match plugin.on_internet_available().await {
        Ok(true) => Ok(CallToolResult::success(vec![Content::text(
            "RTC was uninitialised, set it from the host clock",
        )])),
        Ok(false) => Ok(CallToolResult::success(vec![Content::text(
            "RTC already initialised, nothing to do",
        )])),
        Err(e) => Err(internal_error(format!("Failed to sync RTC: {}", e))),
    }
}

pub async fn get_monitor_state(plugin: &PiVoyagerPlugin) -> Result<CallToolResult, McpError> {
    let config = plugin.config();
    let state = MonitorState {
        supervisor_running: plugin.monitor_running().await,
        online: connectivity::is_online().await,
        binary: config.path.display().to_string(),
        refresh: format_duration(config.refresh_interval().as_secs()),
        watchdog_timeout: format_duration(config.watchdog_timeout),
        query_errors: config.query_errors,
        max_query_failures: config.max_query_failures,
    };
    json_result(&state)
}
