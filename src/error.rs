//! Error type shared by the device, host and plugin layers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },
    #[error("malformed status output: {0}")]
    MalformedStatus(String),
    #[error("unknown battery mode '{0}'")]
    UnknownBatteryMode(String),
    #[error("shutdown failed: {0}")]
    Shutdown(String),
    #[error("failed to set system clock: {0}")]
    Clock(String),
}
