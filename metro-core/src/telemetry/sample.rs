//! Decoded `TELEMETRY` pushes.

use std::fmt;
use std::time::Instant;

use crate::error::MetroError;
use crate::frame::{Frame, field};
use crate::message::MessageType;

/// Shown for a missing `DIRECTION` or `STATION`.
pub const UNKNOWN: &str = "N/A";

/// Cells in a [`battery_bar`].
pub const BATTERY_BAR_CELLS: usize = 10;

/// One status report from the train.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub speed_kmh: f64,
    /// Always within `0..=100`.
    pub battery_percent: u8,
    pub direction: Direction,
    /// Station identifier as sent, or [`UNKNOWN`].
    pub station: String,
    pub received_at: Instant,
}

impl TelemetrySample {
    pub fn battery_level(&self) -> BatteryLevel {
        BatteryLevel::from_percent(self.battery_percent)
    }

    pub fn battery_bar(&self) -> String {
        battery_bar(self.battery_percent)
    }
}

impl TryFrom<&Frame> for TelemetrySample {
    type Error = MetroError;

    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        if !frame.is(MessageType::Telemetry) {
            return Err(MetroError::MalformedFrame(format!(
                "expected TELEMETRY, got {}",
                frame.kind()
            )));
        }

        let raw_speed = frame.require(field::SPEED)?.trim();
        let speed_kmh = raw_speed
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| MetroError::invalid_field(field::SPEED, format!("{raw_speed:?} is not a number")))?;

        let raw_battery = frame.require(field::BATTERY)?.trim();
        let battery_percent = raw_battery
            .parse::<u8>()
            .ok()
            .filter(|b| *b <= 100)
            .ok_or_else(|| {
                MetroError::invalid_field(
                    field::BATTERY,
                    format!("{raw_battery:?} is not an integer in 0..=100"),
                )
            })?;

        let direction = frame
            .field(field::DIRECTION)
            .map(Direction::from)
            .unwrap_or(Direction::Unknown);

        let station = frame
            .field(field::STATION)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        Ok(Self {
            speed_kmh,
            battery_percent,
            direction,
            station,
            received_at: Instant::now(),
        })
    }
}

impl fmt::Display for TelemetrySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} km/h, battery {}%, {}, station {}",
            self.speed_kmh, self.battery_percent, self.direction, self.station
        )
    }
}

// ── Direction ────────────────────────────────────────────────────

/// Direction of travel. Servers may send values beyond the known three.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Stopped,
    Other(String),
    /// Not reported.
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Stopped => "STOPPED",
            Direction::Other(s) => s,
            Direction::Unknown => UNKNOWN,
        }
    }
}

impl From<&str> for Direction {
    fn from(raw: &str) -> Self {
        match raw.trim() {
            "" | UNKNOWN => Direction::Unknown,
            "FORWARD" => Direction::Forward,
            "BACKWARD" => Direction::Backward,
            "STOPPED" => Direction::Stopped,
            other => Direction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Battery ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    /// Below 20%.
    Critical,
    /// Below 50%.
    Low,
    Good,
}

impl BatteryLevel {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..20 => BatteryLevel::Critical,
            20..50 => BatteryLevel::Low,
            _ => BatteryLevel::Good,
        }
    }
}

/// Ten-cell text gauge: one `█` per full 10%, `░` for the rest.
pub fn battery_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) / 10;
    let mut bar = String::with_capacity(BATTERY_BAR_CELLS * 3);
    bar.extend(std::iter::repeat_n('█', filled));
    bar.extend(std::iter::repeat_n('░', BATTERY_BAR_CELLS - filled));
    bar
}
