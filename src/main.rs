//! rmcp-pivoyager: PiVoyager UPS daemon with an MCP surface for the host agent
//!
//! One binary. Polls the UPS through the vendor `pivoyager` tool, draws the
//! battery state, keeps host clock and RTC in sync, and powers the host off
//! on low battery or a button press.
//!
//! Features:
//! - linux: power off through systemd-logind over D-Bus (default)

use clap::{Parser, Subcommand};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    ErrorData as McpError,
    ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// === Modules ===

mod config;
mod connectivity;
mod device;
mod error;
mod host;
mod monitor;
mod plugin;
mod shared;
mod status;
mod tools;
mod ui;

#[cfg(test)]
mod testing;

use config::Config;
use device::{Device, PiVoyagerCli};
use plugin::PiVoyagerPlugin;
use ui::Canvas;

// === CLI ===

#[derive(Parser)]
#[command(name = "rmcp-pivoyager")]
#[command(about = "PiVoyager UPS daemon and MCP server")]
struct Cli {
    /// Config file to use instead of ~/.config/rmcp-pivoyager/pivoyager.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the UPS once and print the status as JSON
    Status,
    /// Open the config file in your editor
    Config,
}

// === Common Parameter Types ===

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmptyParams {}

// === Server ===

pub struct UpsServer {
    pub tool_router: ToolRouter<Self>,
    plugin: Arc<PiVoyagerPlugin>,
    canvas: Arc<RwLock<Canvas>>,
}

impl UpsServer {
    pub fn new(plugin: Arc<PiVoyagerPlugin>, canvas: Arc<RwLock<Canvas>>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            plugin,
            canvas,
        }
    }
}

// Tool implementations
#[rmcp::tool_router]
impl UpsServer {
    #[rmcp::tool(description = "Query the UPS now: status flags, battery mode and voltage, and whether the supervisor would shut down on this reading")]
    pub async fn get_ups_status(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::get_ups_status(&self.plugin).await
    }

    #[rmcp::tool(description = "Get the UPS text currently drawn on the display (glyph ▪ charging, ▫ discharging, then battery voltage)")]
    pub async fn get_battery_display(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::get_battery_display(&self.canvas).await
    }

    #[rmcp::tool(description = "Set the UPS real-time clock from the host clock if the RTC is uninitialised. Call once the host clock is NTP-synced")]
    pub async fn sync_rtc(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::sync_rtc(&self.plugin).await
    }

    #[rmcp::tool(description = "Get supervisor state, connectivity and effective configuration")]
    pub async fn get_monitor_state(
        &self,
        Parameters(_params): Parameters<EmptyParams>,
    ) -> Result<CallToolResult, McpError> {
        tools::get_monitor_state(&self.plugin).await
    }
}

#[rmcp::tool_handler]
impl ServerHandler for UpsServer {
    fn get_info(&self) -> ServerInfo {
        let description = String::from(
            "rmcp-pivoyager: PiVoyager UPS on this board.\n\
             - battery state, charger flags, display text\n\
             - RTC sync, supervisor state\n\
             The host powers off automatically on low battery or when the UPS button is pressed.\n",
        );

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(description),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    match cli.command {
        Some(Commands::Status) => {
            run_status_command(&config).await?;
        }
        Some(Commands::Config) => {
            run_config_command(cli.config)?;
        }
        None => {
            run_server(config).await?;
        }
    }

    Ok(())
}

/// Print one status reading
async fn run_status_command(config: &Config) -> anyhow::Result<()> {
    let device = PiVoyagerCli::new(&config.path);
    let status = device.status().await?;
    let json = serde_json::to_string_pretty(&tools::UpsStatus::from(status))?;
    println!("{}", json);
    Ok(())
}

/// Open config file in user's editor
fn run_config_command(path: Option<PathBuf>) -> anyhow::Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => Config::path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?,
    };

    // Create config dir if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create config file from template if it doesn't exist
    if !config_path.exists() {
        let template = include_str!("../pivoyager.toml.example");
        std::fs::write(&config_path, template)?;
        println!("Created config file: {}", config_path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "nano".to_string());

    println!("Opening {} with {}", config_path.display(), editor);

    std::process::Command::new(&editor)
        .arg(&config_path)
        .status()?;

    Ok(())
}

/// Redraw the display every `ui_refresh_time` seconds
async fn ui_refresh_loop(plugin: Arc<PiVoyagerPlugin>, canvas: Arc<RwLock<Canvas>>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(plugin.config().ui_refresh_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match plugin.on_ui_update(&*canvas).await {
                    Ok(()) => tracing::debug!("display: {}", canvas.read().await.render_text()),
                    Err(e) => tracing::warn!("UPS display update failed: {}", e),
                }
            }
        }
    }
}

/// Fire the internet-available hook once the host first gets online
async fn internet_watch(plugin: Arc<PiVoyagerPlugin>, cancel: CancellationToken) {
    let addr = SocketAddr::from(connectivity::PROBE_ADDR);
    let interval = plugin.config().online_check_interval();

    if connectivity::wait_until_online(addr, interval, &cancel).await {
        tracing::info!("Internet available");
        if let Err(e) = plugin.on_internet_available().await {
            tracing::warn!("RTC sync failed: {}", e);
        }
    }
}

/// Background part of the daemon: plugin lifecycle, display refresh and
/// the internet watcher. Runs until `stop`, whatever happens to MCP sessions.
struct Daemon {
    plugin: Arc<PiVoyagerPlugin>,
    canvas: Arc<RwLock<Canvas>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    async fn start(plugin: Arc<PiVoyagerPlugin>) -> Self {
        let cancel = CancellationToken::new();
        let canvas = Arc::new(RwLock::new(Canvas::default()));

        if let Err(e) = plugin.on_loaded(&cancel).await {
            tracing::error!("pivoyager plugin failed to load: {}", e);
        }
        plugin.on_ui_setup(&mut *canvas.write().await);

        let tasks = vec![
            tokio::spawn(ui_refresh_loop(plugin.clone(), canvas.clone(), cancel.clone())),
            tokio::spawn(internet_watch(plugin.clone(), cancel.clone())),
        ];

        Self {
            plugin,
            canvas,
            cancel,
            tasks,
        }
    }

    fn server(&self) -> UpsServer {
        UpsServer::new(self.plugin.clone(), self.canvas.clone())
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(task));
    }

    /// Cancel everything, unload the plugin (disarming the watchdog) and wait
    /// for the tasks
    async fn stop(self) {
        self.cancel.cancel();
        self.plugin.on_unload().await;
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Daemon task failed: {}", e);
            }
        }
    }
}

/// Serve one MCP session. A failed handshake or a closed transport ends the
/// session only; the daemon keeps supervising the UPS.
async fn serve_mcp<R, W>(server: UpsServer, transport: (R, W), cancel: CancellationToken)
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let service = tokio::select! {
        result = server.serve(transport) => match result {
            Ok(service) => service,
            Err(e) => {
                tracing::warn!("MCP session not established, UPS supervision continues: {}", e);
                return;
            }
        },
        _ = cancel.cancelled() => return,
    };

    tokio::select! {
        result = service.waiting() => match result {
            Ok(reason) => tracing::info!("MCP session ended: {:?}", reason),
            Err(e) => tracing::warn!("MCP session failed: {}", e),
        },
        _ = cancel.cancelled() => {}
    }
}

/// Wait for Ctrl-C or SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Run the plugin lifecycle and the MCP server until the process is signalled
async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting rmcp-pivoyager with {}", config.path.display());

    let plugin = Arc::new(PiVoyagerPlugin::from_config(config));
    let mut daemon = Daemon::start(plugin).await;
    let session = serve_mcp(daemon.server(), rmcp::transport::stdio(), daemon.cancel.clone());
    daemon.spawn(session);

    match shutdown_signal().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to wait for shutdown signal: {}", e),
    }

    daemon.stop().await;
    tracing::info!("rmcp-pivoyager stopped");
    Ok(())
}
