//! # Schedule Protocol Selection
//!
//! Feeder firmware speaks two incompatible schedule protocols:
//!
//! - **Legacy** (below 2.5.0): one `schedule` command carrying the whole list.
//! - **Split** (2.5.0 and later): `schedule_clear`, `schedule_mod_start`,
//!   `schedule_add`, `schedule_mod_end`, published as four separate commands.
//!
//! The split sequence is not transactional. If a step is lost the device keeps
//! whatever it had applied so far; nothing here rolls it back.
//!
//! ## Unknown Versions
//!
//! Older firmware does not report its version reliably, so a device with no
//! recorded version is treated as 2.3.2 and gets the legacy protocol. A device
//! that omits its version while actually running newer firmware would receive
//! the legacy command; that trade-off is deliberate and kept as is.

use super::encoder::Command;
use super::error::CommandError;
use semver::Version;
use serde::{Deserialize, Serialize};

pub const LEGACY_FIRMWARE_VERSION: &str = "2.3.2";
pub const SPLIT_SCHEDULE_VERSION: Version = Version::new(2, 5, 0);
pub const SECONDS_PER_DAY: u32 = 86_400;

const DEVICE_PREFIX_LEN: usize = 16;

/// One configured feeding time, as provided by the schedule source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEvent {
    event_index: u32,
    enabled: bool,
    time_of_day: u32,
    portion: f64,
}

impl ScheduleEvent {
    /// `time_of_day` is seconds since midnight and must be below 86400.
    pub fn new(
        event_index: u32,
        enabled: bool,
        time_of_day: u32,
        portion: f64,
    ) -> Result<Self, CommandError> {
        if time_of_day >= SECONDS_PER_DAY {
            return Err(CommandError::TimeOutOfRange(time_of_day));
        }
        Ok(Self {
            event_index,
            enabled,
            time_of_day,
            portion,
        })
    }

    pub fn event_index(&self) -> u32 {
        self.event_index
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn time_of_day(&self) -> u32 {
        self.time_of_day
    }

    pub fn portion(&self) -> f64 {
        self.portion
    }
}

/// Wire form of a schedule event, shared by both protocols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub active: bool,
    pub automatic: bool,
    pub feeding_id: String,
    pub name: String,
    pub portion: f64,
    pub reminder: bool,
    pub time: u32,
}

impl ScheduleEntry {
    pub fn from_event(device_id: &str, position: usize, event: &ScheduleEvent) -> Self {
        Self {
            active: event.enabled,
            automatic: true,
            feeding_id: feeding_id(device_id, event),
            name: format!("FEED{}", position),
            portion: event.portion,
            reminder: true,
            time: event.time_of_day,
        }
    }
}

/// `<first 16 chars of device>_feed<index>_<H>:<MM><AM|PM>`.
///
/// The hour is rendered from the 24-hour clock with an AM/PM suffix
/// (`14:30PM`); devices already carry ids in this form.
pub fn feeding_id(device_id: &str, event: &ScheduleEvent) -> String {
    let prefix: String = device_id.chars().take(DEVICE_PREFIX_LEN).collect();
    let hour = event.time_of_day / 3600;
    let minute = event.time_of_day / 60 % 60;
    let meridiem = if hour < 12 { "AM" } else { "PM" };
    format!(
        "{}_feed{}_{}:{:02}{}",
        prefix, event.event_index, hour, minute, meridiem
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleProtocol {
    Legacy,
    Split,
}

impl ScheduleProtocol {
    /// Picks the protocol for a recorded firmware version; `None` is legacy.
    pub fn for_firmware(version: Option<&str>) -> Result<Self, CommandError> {
        let version = parse_firmware_version(version.unwrap_or(LEGACY_FIRMWARE_VERSION))?;
        if version < SPLIT_SCHEDULE_VERSION {
            Ok(ScheduleProtocol::Legacy)
        } else {
            Ok(ScheduleProtocol::Split)
        }
    }
}

/// Parses a firmware version, tolerating a `v` prefix and missing
/// minor/patch components (`2.7` is read as `2.7.0`).
pub fn parse_firmware_version(raw: &str) -> Result<Version, CommandError> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['v', 'V'])
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let components = trimmed.split('.').count();
    if (1..3).contains(&components) {
        let padded = format!("{}{}", trimmed, ".0".repeat(3 - components));
        if let Ok(version) = Version::parse(&padded) {
            return Ok(version);
        }
    }

    Err(CommandError::InvalidFirmwareVersion(raw.to_string()))
}

/// Commands to publish, in order, to replace a device's schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    pub protocol: ScheduleProtocol,
    pub commands: Vec<Command>,
}

pub fn plan_schedule(
    device_id: &str,
    events: &[ScheduleEvent],
    firmware_version: Option<&str>,
) -> Result<SchedulePlan, CommandError> {
    let protocol = ScheduleProtocol::for_firmware(firmware_version)?;
    let entries: Vec<ScheduleEntry> = events
        .iter()
        .enumerate()
        .map(|(position, event)| ScheduleEntry::from_event(device_id, position, event))
        .collect();

    let commands = match protocol {
        ScheduleProtocol::Legacy => vec![Command::Schedule(entries)],
        ScheduleProtocol::Split => vec![
            Command::ScheduleClear,
            Command::ScheduleModStart {
                size: entries.len(),
            },
            Command::ScheduleAdd(entries),
            Command::ScheduleModEnd,
        ],
    };

    Ok(SchedulePlan { protocol, commands })
}
