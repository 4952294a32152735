//! Command set
//!
//! Control bytes carry the command family in the high nibble and, for
//! per-channel families, the channel index in the low nibble.

use recon_core::DeviceSettings;

use crate::frame::Frame;

/// Request the channel shown on the controller display
pub const REQ_DISPLAY_CHANNEL: u8 = 0x10;
/// Request temperature and speed (0x30 + channel)
pub const REQ_TEMP_AND_SPEED: u8 = 0x30;
/// Request device settings
pub const REQ_DEVICE_SETTINGS: u8 = 0x50;
/// Request alarm temperature and manual speed (0x70 + channel)
pub const REQ_ALARM_AND_SPEED: u8 = 0x70;
/// Request device status
pub const REQ_DEVICE_STATUS: u8 = 0x90;

/// Set the channel shown on the controller display (0x20 + channel)
pub const SET_DISPLAY_CHANNEL: u8 = 0x20;
/// Set device settings
pub const SET_DEVICE_SETTINGS: u8 = 0x60;
/// Set alarm temperature and manual speed (0x80 + channel)
pub const SET_ALARM_AND_SPEED: u8 = 0x80;

/// Displayed channel (0x20 + channel)
pub const RECV_DISPLAY_CHANNEL: u8 = 0x20;
/// Temperature in F, speed and max speed (0x40 + channel)
pub const RECV_TEMP_AND_SPEED: u8 = 0x40;
/// Device settings bitmask
pub const RECV_DEVICE_SETTINGS: u8 = 0x60;
/// Alarm temperature in F and manual speed (0x80 + channel)
pub const RECV_ALARM_AND_SPEED: u8 = 0x80;
/// Device status
pub const RECV_DEVICE_STATUS: u8 = 0xA0;
/// Command acknowledged
pub const RECV_ACK: u8 = 0xF0;
/// Command rejected
pub const RECV_NAK: u8 = 0xFA;

const FAMILY_MASK: u8 = 0xF0;
const CHANNEL_MASK: u8 = 0x0F;

/// Classified inbound control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Temperature/speed report for a channel
    TempAndSpeed(usize),
    /// Alarm/manual speed report for a channel
    AlarmAndSpeed(usize),
    /// Currently displayed channel
    DisplayChannel(u8),
    /// Device status
    DeviceStatus,
    /// Device settings
    DeviceSettings,
    /// Acknowledge
    Ack,
    /// Negative acknowledge
    Nak,
    /// Anything outside the command set
    Unknown(u8),
}

impl Response {
    /// Classify an inbound control byte
    pub fn classify(control: u8) -> Self {
        let channel = control & CHANNEL_MASK;
        match control & FAMILY_MASK {
            RECV_TEMP_AND_SPEED => return Response::TempAndSpeed(channel as usize),
            RECV_ALARM_AND_SPEED => return Response::AlarmAndSpeed(channel as usize),
            RECV_DISPLAY_CHANNEL => return Response::DisplayChannel(channel),
            _ => {}
        }
        match control {
            RECV_DEVICE_STATUS => Response::DeviceStatus,
            RECV_DEVICE_SETTINGS => Response::DeviceSettings,
            RECV_ACK => Response::Ack,
            RECV_NAK => Response::Nak,
            other => Response::Unknown(other),
        }
    }
}

/// Little-endian RPM pair to a speed value
#[inline]
pub fn rpm_from_bytes(low: u8, high: u8) -> u16 {
    u16::from_le_bytes([low, high])
}

/// Speed value to a little-endian (low, high) pair
///
/// - RPM 1000 (0x03E8) → (0xE8, 0x03)
#[inline]
pub fn rpm_to_bytes(rpm: u16) -> (u8, u8) {
    let [low, high] = rpm.to_le_bytes();
    (low, high)
}

/// Per-channel control byte
#[inline]
fn per_channel(family: u8, channel: usize) -> u8 {
    family | (channel as u8 & CHANNEL_MASK)
}

/// Request temperature and speed for a channel
pub fn request_temp_and_speed(channel: usize) -> Frame {
    Frame::request(per_channel(REQ_TEMP_AND_SPEED, channel))
}

/// Request alarm temperature and manual speed for a channel
pub fn request_alarm_and_speed(channel: usize) -> Frame {
    Frame::request(per_channel(REQ_ALARM_AND_SPEED, channel))
}

/// Request device status
pub fn request_device_status() -> Frame {
    Frame::request(REQ_DEVICE_STATUS)
}

/// Request device settings
pub fn request_device_settings() -> Frame {
    Frame::request(REQ_DEVICE_SETTINGS)
}

/// Request the displayed channel
pub fn request_display_channel() -> Frame {
    Frame::request(REQ_DISPLAY_CHANNEL)
}

/// Set alarm temperature (F) and manual speed for a channel
pub fn set_alarm_and_speed(channel: usize, alarm_f: u8, rpm: u16) -> Frame {
    let (low, high) = rpm_to_bytes(rpm);
    Frame::new(
        per_channel(SET_ALARM_AND_SPEED, channel),
        vec![alarm_f, low, high],
    )
}

/// Set device settings
pub fn set_device_settings(settings: DeviceSettings) -> Frame {
    Frame::new(SET_DEVICE_SETTINGS, vec![settings.to_bits()])
}

/// Set the displayed channel
pub fn set_display_channel(channel: u8) -> Frame {
    Frame::request(per_channel(SET_DISPLAY_CHANNEL, channel as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_per_channel_families() {
        assert_eq!(Response::classify(0x40), Response::TempAndSpeed(0));
        assert_eq!(Response::classify(0x44), Response::TempAndSpeed(4));
        assert_eq!(Response::classify(0x83), Response::AlarmAndSpeed(3));
        assert_eq!(Response::classify(0x22), Response::DisplayChannel(2));
    }

    #[test]
    fn test_classify_device_responses() {
        assert_eq!(Response::classify(0xA0), Response::DeviceStatus);
        assert_eq!(Response::classify(0x60), Response::DeviceSettings);
        assert_eq!(Response::classify(0xF0), Response::Ack);
        assert_eq!(Response::classify(0xFA), Response::Nak);
        assert_eq!(Response::classify(0x31), Response::Unknown(0x31));
        assert_eq!(Response::classify(0xA1), Response::Unknown(0xA1));
    }

    #[test]
    fn test_rpm_bytes_little_endian() {
        assert_eq!(rpm_to_bytes(1000), (0xE8, 0x03));
        assert_eq!(rpm_to_bytes(0), (0x00, 0x00));
        assert_eq!(rpm_to_bytes(0xFFFF), (0xFF, 0xFF));
        assert_eq!(rpm_from_bytes(0xE8, 0x03), 1000);
        assert_eq!(rpm_from_bytes(0x10, 0x27), 10000);
    }

    #[test]
    fn test_request_builders() {
        assert_eq!(request_temp_and_speed(2).control, 0x32);
        assert_eq!(request_alarm_and_speed(4).control, 0x74);
        assert_eq!(request_device_status().control, 0x90);
        assert_eq!(request_device_settings().control, 0x50);
        assert_eq!(request_display_channel().control, 0x10);
        assert!(request_display_channel().payload.is_empty());
    }

    #[test]
    fn test_set_builders() {
        let frame = set_alarm_and_speed(1, 140, 2400);
        assert_eq!(frame.control, 0x81);
        assert_eq!(frame.payload, vec![140, 0x60, 0x09]);

        let settings = DeviceSettings {
            manual: true,
            fahrenheit: false,
            audio: true,
        };
        let frame = set_device_settings(settings);
        assert_eq!(frame.control, 0x60);
        assert_eq!(frame.payload, vec![0x05]);

        assert_eq!(set_display_channel(3).control, 0x23);
    }
}
