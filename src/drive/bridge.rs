// Serial bridge to the motor/sensor microcontroller
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Reply format:  [0xFF, 0xFF, ID, Length, Status, Params..., Checksum]
//
// Motor writes are fire-and-forget; sensor reads are request/response and
// time-boxed by the port timeout, so a dead bridge never blocks a caller.

use serialport::{self, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::hal::MotorSink;
use super::mixer::WheelPower;
use crate::error::HalError;
use crate::messages::LINE_CHANNELS;
use crate::sensors::SensorSource;

pub const DEFAULT_TIMEOUT_MS: u64 = 25;

/// Bridge board ID
pub const BRIDGE_ID: u8 = 0x01;

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Distance reply meaning "no echo"
const NO_ECHO: u16 = 0xFFFF;

/// Instruction set
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Ping = 0x01,
    SetPower = 0x10, // left i16 LE, right i16 LE, permille; no reply
    ReadDistance = 0x20, // reply: u16 LE millimetres
    ReadLine = 0x21, // reply: u8 bitmask, bit 0 = far-left
    ReadPanic = 0x22, // reply: u8 count, u8 level bitmask (active low)
}

pub type Result<T> = std::result::Result<T, HalError>;

/// Low-level bridge link
pub struct BridgeLink {
    port: Box<dyn SerialPort>,
    id: u8,
}

impl BridgeLink {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening serial bridge on {} @ {}", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self {
            port,
            id: BRIDGE_ID,
        })
    }

    /// Second handle on the same port. Used to give the motor path and the
    /// sensor path independent owners.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            port: self.port.try_clone()?,
            id: self.id,
        })
    }

    /// Calculate checksum for a packet (excluding header)
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    /// Build a packet with header and checksum
    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // params + instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());

        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);

        let checksum_data = &packet[2..];
        packet.push(Self::checksum(checksum_data));

        packet
    }

    fn send(&mut self, instruction: Instruction, params: &[u8]) -> Result<()> {
        let packet = Self::build_packet(self.id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one reply frame and return its parameters
    fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                HalError::Timeout
            } else {
                HalError::Io(e)
            }
        })?;
        if header != HEADER {
            return Err(HalError::InvalidResponse {
                reason: format!("Invalid header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        self.port.read_exact(&mut id_length)?;
        let mut remaining = vec![0u8; id_length[1] as usize];
        self.port.read_exact(&mut remaining)?;

        parse_reply(self.id, id_length, &remaining)
    }

    fn request(&mut self, instruction: Instruction) -> Result<Vec<u8>> {
        self.send(instruction, &[])?;
        self.read_response()
    }

    pub fn ping(&mut self) -> Result<bool> {
        match self.request(Instruction::Ping) {
            Ok(_) => Ok(true),
            Err(HalError::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn set_power(&mut self, power: WheelPower) -> Result<()> {
        let left = to_permille(power.left).to_le_bytes();
        let right = to_permille(power.right).to_le_bytes();
        self.send(
            Instruction::SetPower,
            &[left[0], left[1], right[0], right[1]],
        )
    }

    /// Distance in cm, `None` when the sensor saw no echo
    pub fn read_distance(&mut self) -> Result<Option<f64>> {
        let reply = self.request(Instruction::ReadDistance)?;
        if reply.len() < 2 {
            return Err(HalError::InvalidResponse {
                reason: format!("Expected 2 bytes, got {}", reply.len()),
            });
        }
        let mm = u16::from_le_bytes([reply[0], reply[1]]);
        Ok((mm != NO_ECHO).then(|| mm as f64 / 10.0))
    }

    pub fn read_line(&mut self) -> Result<[bool; LINE_CHANNELS]> {
        let reply = self.request(Instruction::ReadLine)?;
        let bits = *reply.first().ok_or_else(|| HalError::InvalidResponse {
            reason: "Empty response".to_string(),
        })?;
        Ok(std::array::from_fn(|i| bits & (1 << i) != 0))
    }

    /// Triggered state of each panic input (levels are active low)
    pub fn read_panic(&mut self) -> Result<Vec<bool>> {
        let reply = self.request(Instruction::ReadPanic)?;
        if reply.len() < 2 {
            return Err(HalError::InvalidResponse {
                reason: format!("Expected 2 bytes, got {}", reply.len()),
            });
        }
        let count = reply[0].min(8) as usize;
        Ok((0..count).map(|i| reply[1] & (1 << i) == 0).collect())
    }
}

/// Validate a reply body (`remaining` = status + params + checksum)
fn parse_reply(expected_id: u8, id_length: [u8; 2], remaining: &[u8]) -> Result<Vec<u8>> {
    let [id, length] = id_length;
    if id != expected_id {
        return Err(HalError::InvalidResponse {
            reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
        });
    }
    if remaining.len() < 2 || remaining.len() != length as usize {
        return Err(HalError::InvalidResponse {
            reason: format!("Bad length {}", length),
        });
    }

    let mut checksum_data = vec![id, length];
    checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
    let expected = BridgeLink::checksum(&checksum_data);
    let actual = remaining[remaining.len() - 1];
    if expected != actual {
        return Err(HalError::ChecksumMismatch { expected, actual });
    }

    let status = remaining[0];
    if status != 0 {
        return Err(HalError::DeviceError { status });
    }
    Ok(remaining[1..remaining.len() - 1].to_vec())
}

fn to_permille(value: f64) -> i16 {
    (value.clamp(-1.0, 1.0) * 1000.0).round() as i16
}

/// Motor half of the bridge
pub struct BridgeMotors {
    link: BridgeLink,
}

impl BridgeMotors {
    pub fn new(link: BridgeLink) -> Self {
        Self { link }
    }
}

impl MotorSink for BridgeMotors {
    fn set_wheel_power(&mut self, power: WheelPower) -> Result<()> {
        debug!("Bridge power: left={:.2}, right={:.2}", power.left, power.right);
        self.link.set_power(power)
    }
}

/// Sensor half of the bridge
pub struct BridgeSensors {
    link: BridgeLink,
}

impl BridgeSensors {
    pub fn new(link: BridgeLink) -> Self {
        Self { link }
    }
}

impl SensorSource for BridgeSensors {
    fn read_distance_cm(&mut self) -> Option<f64> {
        match self.link.read_distance() {
            Ok(distance) => distance,
            Err(e) => {
                debug!("Distance read failed: {}", e);
                None
            }
        }
    }

    fn read_line_channels(&mut self) -> [bool; LINE_CHANNELS] {
        self.link.read_line().unwrap_or_else(|e| {
            debug!("Line read failed: {}", e);
            [false; LINE_CHANNELS]
        })
    }

    fn read_panic_inputs(&mut self) -> Vec<bool> {
        self.link.read_panic().unwrap_or_else(|e| {
            debug!("Panic input read failed: {}", e);
            Vec::new()
        })
    }
}
