//! Handlebar display link protocol
//!
//! Frame format, both directions:
//!
//! - SYNC (1 byte): 0xA5
//! - TYPE (1 byte): message type
//! - LENGTH (1 byte): payload length
//! - PAYLOAD: type-specific data, big-endian
//! - CHECKSUM (1 byte): XOR of TYPE, LENGTH and all payload bytes
//!
//! The main board sends [`Status`] at 10 Hz; the display sends
//! [`DisplayMessage::SetAssistLevel`] when the rider presses a button.

use heapless::Vec;

use pedelec_core::config::MAX_ASSIST_LEVEL;
use pedelec_core::state::{BikeState, VescFault};

/// Frame synchronization byte
pub const FRAME_SYNC: u8 = 0xA5;

/// Largest payload either side sends
pub const MAX_PAYLOAD: usize = 32;

/// Complete frame: SYNC + TYPE + LENGTH + payload + CHECKSUM
pub const MAX_FRAME: usize = MAX_PAYLOAD + 4;

const MSG_STATUS: u8 = 0x01;
const MSG_SET_ASSIST_LEVEL: u8 = 0x10;

const STATUS_LEN: usize = 15;

/// Errors from the display link codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayError {
    /// Checksum mismatch
    InvalidChecksum,
    /// Declared length exceeds the frame limit
    InvalidFrame,
    /// Unknown message type
    UnknownType,
    /// Payload length does not match the message type
    BadLength,
    /// Field value out of range (e.g. assist level above 5)
    InvalidValue,
}

/// Telemetry snapshot shown on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    pub battery_voltage_x10: u16,
    pub battery_current_x10: i16,
    pub motor_power_w: i16,
    pub human_power_w: u16,
    pub speed_mph: u16,
    pub motor_temperature_x10: i16,
    pub assist_level: u8,
    pub brakes_active: bool,
    pub fault_code: u8,
}

impl Status {
    /// Snapshot the display-relevant fields of the shared state
    pub fn from_state(state: &BikeState) -> Self {
        Self {
            battery_voltage_x10: (state.battery_voltage * 10.0) as u16,
            battery_current_x10: (state.battery_current * 10.0) as i16,
            motor_power_w: state.motor_power as i16,
            human_power_w: state.human_power_w,
            speed_mph: state.speed_mph,
            motor_temperature_x10: state.motor_temperature_x10,
            assist_level: state.assist_level,
            brakes_active: state.brakes_are_active,
            fault_code: state.vesc_fault.code(),
        }
    }
}

/// Messages exchanged over the display link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayMessage {
    /// Main board -> display telemetry
    Status(Status),
    /// Display -> main board assist level change (0..=5)
    SetAssistLevel(u8),
}

fn checksum(msg_type: u8, payload: &[u8]) -> u8 {
    let mut sum = msg_type ^ payload.len() as u8;
    for &byte in payload {
        sum ^= byte;
    }
    sum
}

impl DisplayMessage {
    fn msg_type(&self) -> u8 {
        match self {
            Self::Status(_) => MSG_STATUS,
            Self::SetAssistLevel(_) => MSG_SET_ASSIST_LEVEL,
        }
    }

    fn encode_payload(&self) -> Vec<u8, MAX_PAYLOAD> {
        let mut p: Vec<u8, MAX_PAYLOAD> = Vec::new();
        match self {
            Self::Status(s) => {
                // STATUS_LEN bytes, well under capacity
                let _ = p.extend_from_slice(&s.battery_voltage_x10.to_be_bytes());
                let _ = p.extend_from_slice(&s.battery_current_x10.to_be_bytes());
                let _ = p.extend_from_slice(&s.motor_power_w.to_be_bytes());
                let _ = p.extend_from_slice(&s.human_power_w.to_be_bytes());
                let _ = p.extend_from_slice(&s.speed_mph.to_be_bytes());
                let _ = p.extend_from_slice(&s.motor_temperature_x10.to_be_bytes());
                let _ = p.push(s.assist_level);
                let _ = p.push(s.brakes_active as u8);
                let _ = p.push(s.fault_code);
            }
            Self::SetAssistLevel(level) => {
                let _ = p.push(*level);
            }
        }
        p
    }

    fn decode(msg_type: u8, payload: &[u8]) -> Result<Self, DisplayError> {
        match msg_type {
            MSG_STATUS => {
                if payload.len() != STATUS_LEN {
                    return Err(DisplayError::BadLength);
                }
                Ok(Self::Status(Status {
                    battery_voltage_x10: u16::from_be_bytes([payload[0], payload[1]]),
                    battery_current_x10: i16::from_be_bytes([payload[2], payload[3]]),
                    motor_power_w: i16::from_be_bytes([payload[4], payload[5]]),
                    human_power_w: u16::from_be_bytes([payload[6], payload[7]]),
                    speed_mph: u16::from_be_bytes([payload[8], payload[9]]),
                    motor_temperature_x10: i16::from_be_bytes([payload[10], payload[11]]),
                    assist_level: payload[12],
                    brakes_active: payload[13] != 0,
                    fault_code: payload[14],
                }))
            }
            MSG_SET_ASSIST_LEVEL => {
                if payload.len() != 1 {
                    return Err(DisplayError::BadLength);
                }
                let level = payload[0];
                if level > MAX_ASSIST_LEVEL {
                    return Err(DisplayError::InvalidValue);
                }
                Ok(Self::SetAssistLevel(level))
            }
            _ => Err(DisplayError::UnknownType),
        }
    }

    /// Encode a complete frame into `buffer`, returning the length written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, DisplayError> {
        let payload = self.encode_payload();
        let frame_len = payload.len() + 4;
        if buffer.len() < frame_len {
            return Err(DisplayError::InvalidFrame);
        }

        buffer[0] = FRAME_SYNC;
        buffer[1] = self.msg_type();
        buffer[2] = payload.len() as u8;
        buffer[3..3 + payload.len()].copy_from_slice(&payload);
        buffer[3 + payload.len()] = checksum(self.msg_type(), &payload);
        Ok(frame_len)
    }
}

/// Resynchronising parser for inbound display frames
#[derive(Debug, Clone)]
pub struct DisplayFrameParser {
    state: ParseState,
    msg_type: u8,
    expected_len: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    WaitingForSync,
    WaitingForType,
    WaitingForLength,
    ReadingPayload,
    WaitingForChecksum,
}

impl Default for DisplayFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayFrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingForSync,
            msg_type: 0,
            expected_len: 0,
            payload: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForSync;
        self.msg_type = 0;
        self.expected_len = 0;
        self.payload.clear();
    }

    /// Feed one byte; returns a decoded message when a frame completes
    pub fn feed(&mut self, byte: u8) -> Result<Option<DisplayMessage>, DisplayError> {
        match self.state {
            ParseState::WaitingForSync => {
                if byte == FRAME_SYNC {
                    self.state = ParseState::WaitingForType;
                }
                Ok(None)
            }
            ParseState::WaitingForType => {
                self.msg_type = byte;
                self.state = ParseState::WaitingForLength;
                Ok(None)
            }
            ParseState::WaitingForLength => {
                if byte as usize > MAX_PAYLOAD {
                    self.reset();
                    return Err(DisplayError::InvalidFrame);
                }
                self.expected_len = byte;
                self.payload.clear();
                self.state = if byte == 0 {
                    ParseState::WaitingForChecksum
                } else {
                    ParseState::ReadingPayload
                };
                Ok(None)
            }
            ParseState::ReadingPayload => {
                // Cannot overflow: expected_len <= MAX_PAYLOAD
                let _ = self.payload.push(byte);
                if self.payload.len() == self.expected_len as usize {
                    self.state = ParseState::WaitingForChecksum;
                }
                Ok(None)
            }
            ParseState::WaitingForChecksum => {
                let expected = checksum(self.msg_type, &self.payload);
                let msg_type = self.msg_type;
                let result = if byte == expected {
                    DisplayMessage::decode(msg_type, &self.payload).map(Some)
                } else {
                    Err(DisplayError::InvalidChecksum)
                };
                self.reset();
                result
            }
        }
    }

    /// Feed a byte slice, returning the first complete message found
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<DisplayMessage>, DisplayError> {
        for &byte in bytes {
            if let Some(message) = self.feed(byte)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status() -> Status {
        Status {
            battery_voltage_x10: 523,
            battery_current_x10: 82,
            motor_power_w: 428,
            human_power_w: 180,
            speed_mph: 17,
            motor_temperature_x10: 412,
            assist_level: 3,
            brakes_active: false,
            fault_code: 0,
        }
    }

    #[test]
    fn status_roundtrip() {
        let message = DisplayMessage::Status(sample_status());
        let mut buffer = [0u8; MAX_FRAME];
        let len = message.encode(&mut buffer).unwrap();

        let mut parser = DisplayFrameParser::new();
        let decoded = parser.feed_bytes(&buffer[..len]).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn assist_level_roundtrip() {
        let message = DisplayMessage::SetAssistLevel(4);
        let mut buffer = [0u8; MAX_FRAME];
        let len = message.encode(&mut buffer).unwrap();
        assert_eq!(len, 5);

        let mut parser = DisplayFrameParser::new();
        let decoded = parser.feed_bytes(&buffer[..len]).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn assist_level_above_max_is_rejected() {
        let frame = [
            FRAME_SYNC,
            MSG_SET_ASSIST_LEVEL,
            1,
            9,
            checksum(MSG_SET_ASSIST_LEVEL, &[9]),
        ];
        let mut parser = DisplayFrameParser::new();
        assert_eq!(parser.feed_bytes(&frame), Err(DisplayError::InvalidValue));
    }

    #[test]
    fn parser_resyncs_after_garbage() {
        let message = DisplayMessage::SetAssistLevel(2);
        let mut buffer = [0u8; MAX_FRAME];
        let len = message.encode(&mut buffer).unwrap();

        let mut stream: Vec<u8, 40> = Vec::new();
        stream.extend_from_slice(&[0x00, 0x42, 0xff]).unwrap();
        stream.extend_from_slice(&buffer[..len]).unwrap();

        let mut parser = DisplayFrameParser::new();
        let decoded = parser.feed_bytes(&stream).unwrap().unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn corrupt_checksum_is_rejected() {
        let message = DisplayMessage::SetAssistLevel(2);
        let mut buffer = [0u8; MAX_FRAME];
        let len = message.encode(&mut buffer).unwrap();
        buffer[len - 1] ^= 0xff;

        let mut parser = DisplayFrameParser::new();
        assert_eq!(
            parser.feed_bytes(&buffer[..len]),
            Err(DisplayError::InvalidChecksum)
        );
    }

    #[test]
    fn status_snapshot_from_state() {
        let mut state = BikeState::new();
        state.battery_voltage = 52.3;
        state.battery_current = 8.25;
        state.motor_power = 431.5;
        state.speed_mph = 17;
        state.assist_level = 3;
        state.vesc_fault = VescFault::UnderVoltage;

        let status = Status::from_state(&state);
        assert_eq!(status.battery_voltage_x10, 522); // truncation, not rounding
        assert_eq!(status.battery_current_x10, 82);
        assert_eq!(status.motor_power_w, 431);
        assert_eq!(status.fault_code, 2);
    }
}
