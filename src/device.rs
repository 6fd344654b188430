//! PiVoyager access through the vendor `pivoyager` binary
//!
//! Every operation spawns one subprocess and waits for it. The binary and the
//! I2C driver serialize access to the board themselves, so callers may query
//! concurrently.

use crate::error::{Error, Result};
use crate::status::{parse_status, StatusRecord};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Operations the monitor needs from the accessory
#[async_trait]
pub trait Device: Send + Sync {
    /// Query and decode the current status
    async fn status(&self) -> Result<StatusRecord>;

    /// Arm the power cutoff watchdog
    async fn arm_watchdog(&self, seconds: u64) -> Result<()>;

    /// Stop the watchdog so the board keeps power without a supervisor
    async fn disarm_watchdog(&self) -> Result<()>;

    /// Reset the button-pressed flag
    async fn clear_button(&self) -> Result<()>;

    /// Date string from the RTC, in a format `date -s` accepts
    async fn date(&self) -> Result<String>;

    /// Set the RTC from the current host time
    async fn sync_rtc(&self) -> Result<()>;
}

/// `Device` backed by the vendor command line tool
#[derive(Debug, Clone)]
pub struct PiVoyagerCli {
    binary: PathBuf,
}

impl PiVoyagerCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut command = self.binary.display().to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }

    /// Run the binary with `args` and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: self.describe(args),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Error::CommandFailed {
                command: self.describe(args),
                code: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Device for PiVoyagerCli {
    async fn status(&self) -> Result<StatusRecord> {
        let stdout = self.run(&["status"]).await?;
        parse_status(&stdout)
    }

    async fn arm_watchdog(&self, seconds: u64) -> Result<()> {
        let seconds = seconds.to_string();
        self.run(&["watchdog", &seconds]).await.map(|_| ())
    }

    async fn disarm_watchdog(&self) -> Result<()> {
        self.run(&["watchdog", "0"]).await.map(|_| ())
    }

    async fn clear_button(&self) -> Result<()> {
        self.run(&["clear", "button"]).await.map(|_| ())
    }

    async fn date(&self) -> Result<String> {
        let stdout = self.run(&["date"]).await?;
        Ok(stdout.trim().to_string())
    }

    async fn sync_rtc(&self) -> Result<()> {
        self.run(&["date", "sync"]).await.map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::status::{BatteryMode, Flag};
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for the vendor binary
    fn fake_binary(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rmcp-pivoyager-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pivoyager");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // All scripts are written before anything is spawned, so no fork can
    // inherit a script's write handle and hit ETXTBSY.
    #[tokio::test]
    async fn test_cli_against_fake_binary() {
        let status = fake_binary(
            "status",
            r#"[ "$1" = "status" ] || exit 2
printf 'stat pg stat1 inits\nbat charging\nvbat 4.10\nvref 3.30\n'"#,
        );
        let date = fake_binary(
            "date",
            r#"[ "$1" = "date" ] && [ -z "$2" ] || exit 2
echo '2024-05-01 12:00:00'"#,
        );
        let args = fake_binary(
            "args",
            r#"case "$*" in
  "watchdog 60"|"watchdog 0"|"clear button"|"date sync") exit 0 ;;
  *) echo "bad args: $*" >&2; exit 3 ;;
esac"#,
        );
        let failing = fake_binary("fail", "echo 'i2c bus error' >&2\nexit 1");
        let short = fake_binary("short", "printf 'stat pg\\nbat charging\\n'");

        let record = PiVoyagerCli::new(&status).status().await.unwrap();
        assert!(record.has(Flag::PowerGood));
        assert!(record.rtc_initialized());
        assert_eq!(record.battery_mode, BatteryMode::Charging);

        assert_eq!(PiVoyagerCli::new(&date).date().await.unwrap(), "2024-05-01 12:00:00");

        let device = PiVoyagerCli::new(&args);
        device.arm_watchdog(60).await.unwrap();
        device.disarm_watchdog().await.unwrap();
        device.clear_button().await.unwrap();
        device.sync_rtc().await.unwrap();
        assert!(matches!(
            device.status().await,
            Err(Error::CommandFailed { .. })
        ));

        match PiVoyagerCli::new(&failing).status().await {
            Err(Error::CommandFailed { command, stderr, .. }) => {
                assert!(command.ends_with("pivoyager status"));
                assert_eq!(stderr, "i2c bus error");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }

        assert!(matches!(
            PiVoyagerCli::new(&short).status().await,
            Err(Error::MalformedStatus(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let device = PiVoyagerCli::new("/nonexistent/pivoyager");
        assert!(matches!(device.status().await, Err(Error::Spawn { .. })));
    }
}
