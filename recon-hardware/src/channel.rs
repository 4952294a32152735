//! Per-channel state
//!
//! A channel holds what the controller last reported alongside what the
//! operator wants. Targets start unset and are seeded from the first
//! alarm/manual report, so a fresh device never overwrites hardware settings
//! it has not seen yet.

use recon_core::{
    fahrenheit_to_celsius, ChannelSnapshot, ReconError, Result, TemperatureUnit,
};
use tracing::debug;

use crate::protocol::rpm_from_bytes;

/// Payload length of a temperature/speed report
pub const SPEED_REPORT_LEN: usize = 5;

/// Payload length of an alarm/manual report
pub const ALARM_REPORT_LEN: usize = 3;

/// Highest alarm temperature the protocol can carry (F)
pub const MAX_ALARM_F: i32 = 254;

/// Highest speed an operator may request (0xFFFF is reserved)
pub const MAX_TARGET_RPM: i32 = 0xFFFE;

const INIT_SPEED: u8 = 0x01;
const INIT_ALARM: u8 = 0x02;
const INIT_ALL: u8 = INIT_SPEED | INIT_ALARM;

/// State of one physical channel
#[derive(Debug, Clone, Default)]
pub struct Channel {
    current_speed: u16,
    max_speed: u16,
    manual_speed: u16,
    temperature: u8,
    alarm_temperature: u8,
    target_speed: Option<u16>,
    target_alarm: Option<u8>,
    dirty: bool,
    init: u8,
}

impl Channel {
    /// Create a channel with no reports and no targets
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the operator target speed (RPM)
    ///
    /// Fails without touching state if the value is negative, above the
    /// reported maximum, or the reserved 0xFFFF.
    pub fn set_target_speed(&mut self, rpm: i32) -> Result<()> {
        if rpm < 0 {
            return Err(ReconError::InvalidInput(format!(
                "Speed cannot be negative, got {}",
                rpm
            )));
        }
        if rpm > i32::from(self.max_speed) || rpm > MAX_TARGET_RPM {
            return Err(ReconError::InvalidInput(format!(
                "Speed {} exceeds maximum speed {}",
                rpm, self.max_speed
            )));
        }
        self.target_speed = Some(rpm as u16);
        self.dirty = true;
        Ok(())
    }

    /// Set the operator alarm temperature
    pub fn set_target_alarm(&mut self, value: i32, unit: TemperatureUnit) -> Result<()> {
        let fahrenheit = unit.to_fahrenheit(value);
        if !(0..=MAX_ALARM_F).contains(&fahrenheit) {
            return Err(ReconError::InvalidInput(format!(
                "Alarm temperature out of range: {}{} ({}F, must be 0-{}F)",
                value, unit, fahrenheit, MAX_ALARM_F
            )));
        }
        self.target_alarm = Some(fahrenheit as u8);
        self.dirty = true;
        Ok(())
    }

    /// Ingest a temperature/speed report; malformed payloads are dropped
    pub fn ingest_speed_report(&mut self, payload: &[u8]) {
        if payload.len() != SPEED_REPORT_LEN {
            debug!(
                "Dropping speed report with {} bytes (expected {})",
                payload.len(),
                SPEED_REPORT_LEN
            );
            return;
        }
        self.temperature = payload[0];
        self.current_speed = rpm_from_bytes(payload[1], payload[2]);
        self.max_speed = rpm_from_bytes(payload[3], payload[4]);
        self.init |= INIT_SPEED;
    }

    /// Ingest an alarm/manual report; malformed payloads are dropped
    ///
    /// Unset targets adopt the reported values.
    pub fn ingest_alarm_report(&mut self, payload: &[u8]) {
        if payload.len() != ALARM_REPORT_LEN {
            debug!(
                "Dropping alarm report with {} bytes (expected {})",
                payload.len(),
                ALARM_REPORT_LEN
            );
            return;
        }
        self.alarm_temperature = payload[0];
        self.manual_speed = rpm_from_bytes(payload[1], payload[2]);
        self.init |= INIT_ALARM;

        self.target_speed.get_or_insert(self.manual_speed);
        self.target_alarm.get_or_insert(self.alarm_temperature);
    }

    /// Values to write for a pending change: (alarm F, speed RPM)
    ///
    /// Unset targets fall back to what the controller last reported.
    pub fn pending_write(&self) -> (u8, u16) {
        (
            self.target_alarm.unwrap_or(self.alarm_temperature),
            self.target_speed.unwrap_or(self.manual_speed),
        )
    }

    /// Mark the pending change as flushed
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// A target changed since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Both report kinds received at least once
    pub fn is_initialized(&self) -> bool {
        self.init & INIT_ALL == INIT_ALL
    }

    /// Current speed (RPM)
    pub fn speed(&self) -> u16 {
        self.current_speed
    }

    /// Maximum speed the fan supports (RPM)
    pub fn max_speed(&self) -> u16 {
        self.max_speed
    }

    /// Manual speed as set on the controller (RPM)
    pub fn manual_speed(&self) -> u16 {
        self.manual_speed
    }

    /// Current temperature in Fahrenheit
    pub fn temperature_f(&self) -> i32 {
        i32::from(self.temperature)
    }

    /// Current temperature in Celsius
    pub fn temperature_c(&self) -> i32 {
        fahrenheit_to_celsius(self.temperature_f())
    }

    /// Current alarm temperature in Fahrenheit
    pub fn alarm_temperature_f(&self) -> i32 {
        i32::from(self.alarm_temperature)
    }

    /// Current alarm temperature in Celsius
    pub fn alarm_temperature_c(&self) -> i32 {
        fahrenheit_to_celsius(self.alarm_temperature_f())
    }

    /// Operator target speed, if any
    pub fn target_speed(&self) -> Option<u16> {
        self.target_speed
    }

    /// Operator target alarm temperature in Fahrenheit, if any
    pub fn target_alarm_f(&self) -> Option<u8> {
        self.target_alarm
    }

    /// Point-in-time view
    pub fn snapshot(&self, index: usize) -> ChannelSnapshot {
        ChannelSnapshot {
            index,
            temperature_c: self.temperature_c(),
            temperature_f: self.temperature_f(),
            speed: self.current_speed,
            max_speed: self.max_speed,
            manual_speed: self.manual_speed,
            target_speed: self.target_speed,
            alarm_temperature_c: self.alarm_temperature_c(),
            alarm_temperature_f: self.alarm_temperature_f(),
            target_alarm_temperature_f: self.target_alarm,
            initialized: self.is_initialized(),
        }
    }
}
