//! Test doubles for the device and host seams

use crate::device::Device;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::status::{parse_status, StatusRecord};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Status,
    ArmWatchdog(u64),
    DisarmWatchdog,
    ClearButton,
    Date,
    SyncRtc,
}

/// Build `pivoyager status` output from flag tokens
pub fn status_output(flags: &[&str], mode: &str, vbat: &str) -> String {
    let mut first = String::from("stat");
    for flag in flags {
        first.push(' ');
        first.push_str(flag);
    }
    format!("{}\nbat {}\nvbat {}\nvref 3.30\n", first, mode, vbat)
}

/// Device that replays queued status outputs and records every call.
///
/// Once the queue is drained the last output keeps being returned.
pub struct ScriptedDevice {
    outputs: Mutex<VecDeque<std::result::Result<String, String>>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<DeviceCall>>,
    date: String,
    watchdog_fails: bool,
    status_delay: Option<Duration>,
}

impl ScriptedDevice {
    pub fn new(outputs: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            date: "Wed May  1 12:00:00 UTC 2024".to_string(),
            watchdog_fails: false,
            status_delay: None,
        }
    }

    pub fn always(output: String) -> Self {
        Self::new(vec![Ok(output)])
    }

    /// Make every `watchdog` command fail
    pub fn with_failing_watchdog(mut self) -> Self {
        self.watchdog_fails = true;
        self
    }

    /// Make every status query take `delay`
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    fn watchdog(&self, call: DeviceCall, args: String) -> Result<()> {
        self.record(call);
        if self.watchdog_fails {
            return Err(Error::CommandFailed {
                command: format!("pivoyager watchdog {}", args),
                code: "exit status: 1".to_string(),
                stderr: "i2c error".to_string(),
            });
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &DeviceCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Device for ScriptedDevice {
    async fn status(&self) -> Result<StatusRecord> {
        self.record(DeviceCall::Status);
        if let Some(delay) = self.status_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.outputs.lock().unwrap().pop_front();
        let output = match next {
            Some(Ok(output)) => {
                *self.last.lock().unwrap() = Some(output.clone());
                output
            }
            Some(Err(stderr)) => {
                return Err(Error::CommandFailed {
                    command: "pivoyager status".to_string(),
                    code: "exit status: 1".to_string(),
                    stderr,
                })
            }
            None => match self.last.lock().unwrap().clone() {
                Some(output) => output,
                None => return Err(Error::MalformedStatus("no scripted output".to_string())),
            },
        };
        parse_status(&output)
    }

    async fn arm_watchdog(&self, seconds: u64) -> Result<()> {
        self.watchdog(DeviceCall::ArmWatchdog(seconds), seconds.to_string())
    }

    async fn disarm_watchdog(&self) -> Result<()> {
        self.watchdog(DeviceCall::DisarmWatchdog, "0".to_string())
    }

    async fn clear_button(&self) -> Result<()> {
        self.record(DeviceCall::ClearButton);
        Ok(())
    }

    async fn date(&self) -> Result<String> {
        self.record(DeviceCall::Date);
        Ok(self.date.clone())
    }

    async fn sync_rtc(&self) -> Result<()> {
        self.record(DeviceCall::SyncRtc);
        Ok(())
    }
}

/// Host that only records what it was asked to do
#[derive(Default)]
pub struct RecordingHost {
    shutdowns: Mutex<usize>,
    clocks: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn shutdowns(&self) -> usize {
        *self.shutdowns.lock().unwrap()
    }

    pub fn clocks(&self) -> Vec<String> {
        self.clocks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn shutdown(&self) -> Result<()> {
        *self.shutdowns.lock().unwrap() += 1;
        Ok(())
    }

    async fn set_clock(&self, date: &str) -> Result<()> {
        self.clocks.lock().unwrap().push(date.to_string());
        Ok(())
    }
}
