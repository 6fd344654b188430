//! PiVoyager status record and the parser for `pivoyager status` output
//!
//! The vendor binary prints four whitespace-delimited lines:
//!
//! ```text
//! stat pg stat1 inits
//! bat charging
//! vbat 4.10
//! vref 3.30
//! ```
//!
//! Flag meanings follow the MCP73871 charger status pins (pg, stat1, stat2)
//! plus the board's own button and RTC markers.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A status flag reported by the accessory firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Flag {
    /// External power present
    #[serde(rename = "pg")]
    PowerGood,
    #[serde(rename = "stat1")]
    Stat1,
    #[serde(rename = "stat2")]
    Stat2,
    /// The board button was pressed since the last `clear button`
    #[serde(rename = "button")]
    Button,
    /// The RTC holds a valid date
    #[serde(rename = "inits")]
    RtcInitialized,
}

impl Flag {
    pub fn token(self) -> &'static str {
        match self {
            Flag::PowerGood => "pg",
            Flag::Stat1 => "stat1",
            Flag::Stat2 => "stat2",
            Flag::Button => "button",
            Flag::RtcInitialized => "inits",
        }
    }
}

impl FromStr for Flag {
    type Err = ();

    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        match token {
            "pg" => Ok(Flag::PowerGood),
            "stat1" => Ok(Flag::Stat1),
            "stat2" => Ok(Flag::Stat2),
            "button" => Ok(Flag::Button),
            "inits" => Ok(Flag::RtcInitialized),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Set of flags from the first status line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub known: BTreeSet<Flag>,
    /// Tokens outside the known vocabulary, kept in output order
    pub unrecognized: Vec<String>,
}

impl Flags {
    pub fn contains(&self, flag: Flag) -> bool {
        self.known.contains(&flag)
    }

    pub fn insert(&mut self, flag: Flag) {
        self.known.insert(flag);
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self {
            known: iter.into_iter().collect(),
            unrecognized: Vec::new(),
        }
    }
}

impl<'a> FromIterator<&'a str> for Flags {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut flags = Flags::default();
        for token in iter {
            match token.parse::<Flag>() {
                Ok(flag) => flags.insert(flag),
                Err(()) => {
                    tracing::debug!("Unrecognized pivoyager flag: {}", token);
                    flags.unrecognized.push(token.to_string());
                }
            }
        }
        flags
    }
}

/// Battery mode from the second status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Charging,
    Discharging,
    /// Anything the firmware reports that we have no glyph for
    Other(String),
}

impl From<&str> for BatteryMode {
    fn from(mode: &str) -> Self {
        match mode {
            "charging" => BatteryMode::Charging,
            "discharging" => BatteryMode::Discharging,
            other => BatteryMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatteryMode::Charging => f.write_str("charging"),
            BatteryMode::Discharging => f.write_str("discharging"),
            BatteryMode::Other(mode) => f.write_str(mode),
        }
    }
}

/// One decoded `pivoyager status` reading. Valid only for the instant it was queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub flags: Flags,
    pub battery_mode: BatteryMode,
    /// Display-only, never parsed to a number
    pub battery_voltage: String,
    pub reference_voltage: String,
}

impl StatusRecord {
    pub fn has(&self, flag: Flag) -> bool {
        self.flags.contains(flag)
    }

    pub fn rtc_initialized(&self) -> bool {
        self.has(Flag::RtcInitialized)
    }
}

impl FromStr for StatusRecord {
    type Err = Error;

    fn from_str(output: &str) -> Result<Self> {
        parse_status(output)
    }
}

/// Second whitespace-delimited token of a status line
fn value_of<'a>(line: Option<&'a str>, index: usize) -> Result<&'a str> {
    let line = line.ok_or_else(|| {
        Error::MalformedStatus(format!("expected 4 lines, missing line {}", index))
    })?;
    line.split_whitespace().nth(1).ok_or_else(|| {
        Error::MalformedStatus(format!("line {} has no value: {:?}", index, line))
    })
}

/// Decode the 4-line output of `pivoyager status`
pub fn parse_status(output: &str) -> Result<StatusRecord> {
    let mut lines = output.lines();

    let flags_line = lines
        .next()
        .ok_or_else(|| Error::MalformedStatus("empty output".to_string()))?;
    let flags: Flags = flags_line.split_whitespace().skip(1).collect();

    let battery_mode = BatteryMode::from(value_of(lines.next(), 1)?);
    let battery_voltage = value_of(lines.next(), 2)?.to_string();
    let reference_voltage = value_of(lines.next(), 3)?.to_string();

    Ok(StatusRecord {
        flags,
        battery_mode,
        battery_voltage,
        reference_voltage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_charging_status() {
        let record = parse_status("stat pg stat1\nbat charging\nvbat 4.10\nvref 3.30\n").unwrap();

        let expected: Flags = [Flag::PowerGood, Flag::Stat1].into_iter().collect();
        assert_eq!(record.flags, expected);
        assert_eq!(record.battery_mode, BatteryMode::Charging);
        assert_eq!(record.battery_voltage, "4.10");
        assert_eq!(record.reference_voltage, "3.30");
    }

    #[test]
    fn test_parse_vendor_layout() {
        let output = "status:  stat2 inits button\nbat:     discharging\nvbat:    3.95V\nvref:    3.32V\n";
        let record = parse_status(output).unwrap();

        assert!(record.has(Flag::Stat2));
        assert!(record.has(Flag::Button));
        assert!(record.rtc_initialized());
        assert!(!record.has(Flag::PowerGood));
        assert_eq!(record.battery_mode, BatteryMode::Discharging);
        assert_eq!(record.battery_voltage, "3.95V");
    }

    #[test]
    fn test_parse_keeps_unrecognized_flags() {
        let record = parse_status("stat pg 5v\nbat charging\nvbat 4.20\nvref 3.30").unwrap();
        assert!(record.has(Flag::PowerGood));
        assert_eq!(record.flags.unrecognized, vec!["5v".to_string()]);
    }

    #[test]
    fn test_parse_label_only_first_line() {
        let record = parse_status("stat\nbat charging\nvbat 4.20\nvref 3.30").unwrap();
        assert!(record.flags.known.is_empty());
    }

    #[test]
    fn test_parse_unknown_mode_is_kept() {
        let record = parse_status("stat pg\nbat full\nvbat 4.20\nvref 3.30").unwrap();
        assert_eq!(record.battery_mode, BatteryMode::Other("full".to_string()));
    }

    #[test]
    fn test_parse_short_output_fails() {
        let err = parse_status("stat pg\nbat charging\n").unwrap_err();
        assert!(matches!(err, Error::MalformedStatus(_)));

        let err = parse_status("").unwrap_err();
        assert!(matches!(err, Error::MalformedStatus(_)));
    }

    #[test]
    fn test_parse_missing_value_fails() {
        let err = parse_status("stat pg\nbat\nvbat 4.20\nvref 3.30").unwrap_err();
        assert!(matches!(err, Error::MalformedStatus(_)));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let output = "stat pg stat1 inits\nbat charging\nvbat 4.10\nvref 3.30\n";
        assert_eq!(parse_status(output).unwrap(), parse_status(output).unwrap());
        assert_eq!(output.parse::<StatusRecord>().unwrap(), parse_status(output).unwrap());
    }

    #[test]
    fn test_flag_tokens_round_trip() {
        for flag in [Flag::PowerGood, Flag::Stat1, Flag::Stat2, Flag::Button, Flag::RtcInitialized] {
            assert_eq!(flag.token().parse::<Flag>(), Ok(flag));
        }
    }
}
