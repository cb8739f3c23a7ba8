//! VESC UART packet codec
//!
//! Short-frame format (payloads up to 255 bytes, plenty for this use):
//!
//! - START (1 byte): 0x02
//! - LENGTH (1 byte): payload length
//! - PAYLOAD: command id followed by command data, all big-endian
//! - CRC (2 bytes): CRC-16/XMODEM over the payload only
//! - STOP (1 byte): 0x03
//!
//! Only the four commands the control loop needs are implemented.

use heapless::Vec;

/// Frame start byte for short packets
pub const PACKET_START: u8 = 0x02;
/// Frame stop byte
pub const PACKET_STOP: u8 = 0x03;

/// Longest payload we ever exchange (COMM_GET_VALUES response)
pub const MAX_PAYLOAD: usize = 64;

/// Complete frame: START + LENGTH + payload + CRC16 + STOP
pub const MAX_PACKET: usize = MAX_PAYLOAD + 5;

/// Keep-alive; resets the VESC's motor-stop watchdog
pub const COMM_ALIVE: u8 = 30;
/// Telemetry poll
pub const COMM_GET_VALUES: u8 = 4;
/// Motor current command (milliamps, i32)
pub const COMM_SET_CURRENT: u8 = 6;
/// Brake current command (milliamps, i32)
pub const COMM_SET_CURRENT_BRAKE: u8 = 7;

/// Errors from encoding or decoding VESC packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VescError {
    /// Payload exceeds the short-frame limit
    PayloadTooLarge,
    /// CRC mismatch on a received frame
    InvalidCrc,
    /// Missing stop byte
    InvalidFrame,
    /// Telemetry payload shorter than expected
    Truncated,
    /// Payload carried an unexpected command id
    UnexpectedCommand,
}

/// CRC-16/XMODEM (poly 0x1021, init 0), as used by the VESC firmware
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Wrap a payload in the short-frame format
pub fn encode_packet(payload: &[u8]) -> Result<Vec<u8, MAX_PACKET>, VescError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(VescError::PayloadTooLarge);
    }

    let crc = crc16(payload);
    let mut packet = Vec::new();
    // Capacity is MAX_PACKET, checked above
    let _ = packet.push(PACKET_START);
    let _ = packet.push(payload.len() as u8);
    let _ = packet.extend_from_slice(payload);
    let _ = packet.push((crc >> 8) as u8);
    let _ = packet.push((crc & 0xff) as u8);
    let _ = packet.push(PACKET_STOP);
    Ok(packet)
}

/// Heartbeat packet
pub fn encode_alive() -> Vec<u8, MAX_PACKET> {
    // Single-byte payload always fits
    encode_packet(&[COMM_ALIVE]).unwrap_or_default()
}

/// Telemetry poll packet
pub fn encode_get_values() -> Vec<u8, MAX_PACKET> {
    encode_packet(&[COMM_GET_VALUES]).unwrap_or_default()
}

fn encode_current_command(command: u8, amps: f32) -> Vec<u8, MAX_PACKET> {
    let milliamps = (amps * 1000.0) as i32;
    let ma = milliamps.to_be_bytes();
    encode_packet(&[command, ma[0], ma[1], ma[2], ma[3]]).unwrap_or_default()
}

/// Motor current command
pub fn encode_set_current(amps: f32) -> Vec<u8, MAX_PACKET> {
    encode_current_command(COMM_SET_CURRENT, amps)
}

/// Brake (regenerative) current command
pub fn encode_set_current_brake(amps: f32) -> Vec<u8, MAX_PACKET> {
    encode_current_command(COMM_SET_CURRENT_BRAKE, amps)
}

/// Big-endian field reader over a telemetry payload
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], VescError> {
        let end = self.pos + n;
        let slice = self.buf.get(self.pos..end).ok_or(VescError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VescError> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, VescError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, VescError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Decoded `COMM_GET_VALUES` telemetry, reduced to the fields the bike uses
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    /// MOSFET temperature, deg C x10
    pub temp_fet_x10: i16,
    /// Motor temperature as measured by the VESC, deg C x10
    pub temp_motor_x10: i16,
    /// Average motor phase current, amps
    pub motor_current_a: f32,
    /// Average battery-side current, amps
    pub input_current_a: f32,
    /// Battery voltage, volts
    pub input_voltage_v: f32,
    /// Electrical rpm
    pub rpm: i32,
    /// Raw fault code (0 = none)
    pub fault_code: u8,
}

impl Telemetry {
    /// Decode a `COMM_GET_VALUES` response payload (command id included)
    pub fn parse(payload: &[u8]) -> Result<Self, VescError> {
        let mut r = Reader::new(payload);
        if r.u8()? != COMM_GET_VALUES {
            return Err(VescError::UnexpectedCommand);
        }

        let temp_fet_x10 = r.i16()?;
        let temp_motor_x10 = r.i16()?;
        let motor_current_a = r.i32()? as f32 / 100.0;
        let input_current_a = r.i32()? as f32 / 100.0;
        let _avg_id = r.i32()?;
        let _avg_iq = r.i32()?;
        let _duty_now = r.i16()?;
        let rpm = r.i32()?;
        let input_voltage_v = r.i16()? as f32 / 10.0;
        let _amp_hours = r.i32()?;
        let _amp_hours_charged = r.i32()?;
        let _watt_hours = r.i32()?;
        let _watt_hours_charged = r.i32()?;
        let _tachometer = r.i32()?;
        let _tachometer_abs = r.i32()?;
        let fault_code = r.u8()?;

        Ok(Self {
            temp_fet_x10,
            temp_motor_x10,
            motor_current_a,
            input_current_a,
            input_voltage_v,
            rpm,
            fault_code,
        })
    }
}

/// State machine for parsing inbound VESC frames byte by byte
#[derive(Debug, Clone)]
pub struct VescFrameParser {
    state: ParseState,
    payload: Vec<u8, MAX_PAYLOAD>,
    expected_len: u8,
    crc: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    WaitingForStart,
    WaitingForLength,
    ReadingPayload,
    WaitingForCrcHigh,
    WaitingForCrcLow,
    WaitingForStop,
}

impl Default for VescFrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VescFrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::WaitingForStart,
            payload: Vec::new(),
            expected_len: 0,
            crc: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = ParseState::WaitingForStart;
        self.payload.clear();
        self.expected_len = 0;
        self.crc = 0;
    }

    /// Feed a single byte.
    ///
    /// Returns `Ok(Some(payload))` when a complete, CRC-valid frame ends,
    /// `Ok(None)` when more bytes are needed. On error the parser resets
    /// and hunts for the next start byte.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8, MAX_PAYLOAD>>, VescError> {
        match self.state {
            ParseState::WaitingForStart => {
                if byte == PACKET_START {
                    self.state = ParseState::WaitingForLength;
                }
                Ok(None)
            }
            ParseState::WaitingForLength => {
                if byte == 0 || byte as usize > MAX_PAYLOAD {
                    self.reset();
                    return Err(VescError::InvalidFrame);
                }
                self.expected_len = byte;
                self.payload.clear();
                self.state = ParseState::ReadingPayload;
                Ok(None)
            }
            ParseState::ReadingPayload => {
                // Cannot overflow: expected_len <= MAX_PAYLOAD
                let _ = self.payload.push(byte);
                if self.payload.len() == self.expected_len as usize {
                    self.state = ParseState::WaitingForCrcHigh;
                }
                Ok(None)
            }
            ParseState::WaitingForCrcHigh => {
                self.crc = (byte as u16) << 8;
                self.state = ParseState::WaitingForCrcLow;
                Ok(None)
            }
            ParseState::WaitingForCrcLow => {
                self.crc |= byte as u16;
                if self.crc != crc16(&self.payload) {
                    self.reset();
                    return Err(VescError::InvalidCrc);
                }
                self.state = ParseState::WaitingForStop;
                Ok(None)
            }
            ParseState::WaitingForStop => {
                if byte != PACKET_STOP {
                    self.reset();
                    return Err(VescError::InvalidFrame);
                }
                let payload = self.payload.clone();
                self.reset();
                Ok(Some(payload))
            }
        }
    }

    /// Feed a byte slice, returning the first complete frame found
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<Vec<u8, MAX_PAYLOAD>>, VescError> {
        for &byte in bytes {
            if let Some(payload) = self.feed(byte)? {
                return Ok(Some(payload));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn crc16_known_vector() {
        // CRC-16/XMODEM check value
        assert_eq!(crc16(b"123456789"), 0x31c3);
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn alive_packet_layout() {
        let packet = encode_alive();
        assert_eq!(packet[0], PACKET_START);
        assert_eq!(packet[1], 1); // length
        assert_eq!(packet[2], COMM_ALIVE);
        assert_eq!(packet[packet.len() - 1], PACKET_STOP);
    }

    #[test]
    fn set_current_encodes_milliamps() {
        let packet = encode_set_current(12.5);
        assert_eq!(packet[1], 5); // command + i32
        assert_eq!(packet[2], COMM_SET_CURRENT);
        let ma = i32::from_be_bytes([packet[3], packet[4], packet[5], packet[6]]);
        assert_eq!(ma, 12_500);
    }

    #[test]
    fn negative_brake_current() {
        let packet = encode_set_current_brake(-3.0);
        let ma = i32::from_be_bytes([packet[3], packet[4], packet[5], packet[6]]);
        assert_eq!(ma, -3_000);
    }

    #[test]
    fn parser_roundtrip() {
        let packet = encode_set_current(7.0);
        let mut parser = VescFrameParser::new();
        let payload = parser.feed_bytes(&packet).unwrap().unwrap();
        assert_eq!(payload[0], COMM_SET_CURRENT);
        assert_eq!(payload.len(), 5);
    }

    #[test]
    fn parser_resyncs_after_garbage() {
        let packet = encode_alive();
        let mut data: Vec<u8, 32> = Vec::new();
        data.extend_from_slice(&[0xff, 0x00, 0x13]).unwrap();
        data.extend_from_slice(&packet).unwrap();

        let mut parser = VescFrameParser::new();
        let payload = parser.feed_bytes(&data).unwrap().unwrap();
        assert_eq!(payload[0], COMM_ALIVE);
    }

    #[test]
    fn parser_rejects_bad_crc() {
        let mut packet = encode_alive();
        let crc_hi = packet.len() - 3;
        packet[crc_hi] ^= 0xff;

        let mut parser = VescFrameParser::new();
        assert_eq!(parser.feed_bytes(&packet), Err(VescError::InvalidCrc));
    }

    fn sample_values_payload() -> Vec<u8, MAX_PAYLOAD> {
        let mut p: Vec<u8, MAX_PAYLOAD> = Vec::new();
        p.push(COMM_GET_VALUES).unwrap();
        p.extend_from_slice(&250i16.to_be_bytes()).unwrap(); // fet 25.0C
        p.extend_from_slice(&412i16.to_be_bytes()).unwrap(); // motor 41.2C
        p.extend_from_slice(&1550i32.to_be_bytes()).unwrap(); // 15.5A motor
        p.extend_from_slice(&820i32.to_be_bytes()).unwrap(); // 8.2A input
        p.extend_from_slice(&0i32.to_be_bytes()).unwrap(); // id
        p.extend_from_slice(&0i32.to_be_bytes()).unwrap(); // iq
        p.extend_from_slice(&500i16.to_be_bytes()).unwrap(); // duty
        p.extend_from_slice(&3200i32.to_be_bytes()).unwrap(); // rpm
        p.extend_from_slice(&523i16.to_be_bytes()).unwrap(); // 52.3V
        for _ in 0..6 {
            p.extend_from_slice(&0i32.to_be_bytes()).unwrap(); // counters
        }
        p.push(2).unwrap(); // under-voltage fault
        p
    }

    #[test]
    fn telemetry_decode() {
        let telemetry = Telemetry::parse(&sample_values_payload()).unwrap();
        assert_eq!(telemetry.temp_fet_x10, 250);
        assert_eq!(telemetry.temp_motor_x10, 412);
        assert!((telemetry.motor_current_a - 15.5).abs() < 1e-3);
        assert!((telemetry.input_current_a - 8.2).abs() < 1e-3);
        assert!((telemetry.input_voltage_v - 52.3).abs() < 1e-3);
        assert_eq!(telemetry.rpm, 3200);
        assert_eq!(telemetry.fault_code, 2);
    }

    #[test]
    fn telemetry_rejects_truncation() {
        let payload = sample_values_payload();
        let result = Telemetry::parse(&payload[..20]);
        assert_eq!(result, Err(VescError::Truncated));
    }

    #[test]
    fn telemetry_rejects_wrong_command() {
        assert_eq!(
            Telemetry::parse(&[COMM_ALIVE]),
            Err(VescError::UnexpectedCommand)
        );
    }

    proptest! {
        #[test]
        fn parser_recovers_frame_after_line_noise(
            noise in proptest::collection::vec(
                any::<u8>().prop_filter("no start byte", |b| *b != PACKET_START),
                0..24,
            ),
            payload in proptest::collection::vec(any::<u8>(), 1..MAX_PAYLOAD),
        ) {
            let packet = encode_packet(&payload).unwrap();
            let mut parser = VescFrameParser::new();

            for &byte in &noise {
                let _ = parser.feed(byte);
            }

            // The frame that follows decodes intact, start/stop bytes in
            // the payload included
            let mut decoded = None;
            for &byte in &packet {
                if let Ok(Some(p)) = parser.feed(byte) {
                    decoded = Some(p);
                }
            }
            prop_assert_eq!(decoded.as_deref(), Some(payload.as_slice()));
        }
    }
}
