//! Modbus RTU frame codec for "read holding registers" (function 0x03).
//!
//! Pure byte work: no I/O happens here.

use log::debug;

use super::crc::{append_crc, crc16_modbus};
use crate::utils::error::{ExceptionCode, ModbusError};

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Protocol limit for a single 0x03 request.
pub const MAX_READ_REGISTERS: u16 = 125;

pub const MIN_SLAVE_ID: u8 = 1;
pub const MAX_SLAVE_ID: u8 = 247;

const CRC_LEN: usize = 2;
// slave id + function code + exception code + crc
const EXCEPTION_FRAME_LEN: usize = 5;

/// One read-holding-registers transaction, validated before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusRequest {
    pub slave_id: u8,
    pub start_address: u16,
    pub count: u16,
}

impl ModbusRequest {
    pub fn read_holding_registers(
        slave_id: u8,
        start_address: u16,
        count: u16,
    ) -> Result<Self, ModbusError> {
        if !(MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&slave_id) {
            return Err(ModbusError::InvalidArgument(format!(
                "slave id {} outside {}-{}",
                slave_id, MIN_SLAVE_ID, MAX_SLAVE_ID
            )));
        }

        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ModbusError::InvalidArgument(format!(
                "register count {} outside 1-{}",
                count, MAX_READ_REGISTERS
            )));
        }

        if start_address as u32 + count as u32 > 0x1_0000 {
            return Err(ModbusError::InvalidArgument(format!(
                "range {} + {} runs past the last register address",
                start_address, count
            )));
        }

        Ok(Self {
            slave_id,
            start_address,
            count,
        })
    }

    /// `[slave, 0x03, addr_hi, addr_lo, count_hi, count_lo, crc_lo, crc_hi]`
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(8);
        frame.push(self.slave_id);
        frame.push(READ_HOLDING_REGISTERS);
        frame.extend_from_slice(&self.start_address.to_be_bytes());
        frame.extend_from_slice(&self.count.to_be_bytes());
        append_crc(&mut frame);
        frame
    }

    /// Length of a well-formed, non-exception reply to this request.
    pub fn expected_response_len(&self) -> usize {
        3 + self.count as usize * 2 + CRC_LEN
    }

    pub fn decode_response(&self, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
        decode_response(frame, self.slave_id, self.count)
    }
}

pub fn encode_read_holding_registers(
    slave_id: u8,
    start_address: u16,
    count: u16,
) -> Result<Vec<u8>, ModbusError> {
    Ok(ModbusRequest::read_holding_registers(slave_id, start_address, count)?.encode())
}

/// Validates a reply frame and returns its register values.
///
/// The CRC is checked before any header field so that a corrupted
/// slave id or function code is reported as a CRC failure.
pub fn decode_response(
    frame: &[u8],
    slave_id: u8,
    count: u16,
) -> Result<Vec<u16>, ModbusError> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        return Err(ModbusError::MalformedResponse(format!(
            "response too short: {} bytes",
            frame.len()
        )));
    }

    let (body, trailer) = frame.split_at(frame.len() - CRC_LEN);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    let expected = crc16_modbus(body);
    if received != expected {
        debug!("❌ CRC mismatch on frame [{}]", hex::encode(frame));
        return Err(ModbusError::CrcError { expected, received });
    }

    if body[0] != slave_id {
        return Err(ModbusError::MalformedResponse(format!(
            "reply from slave {} while talking to slave {}",
            body[0], slave_id
        )));
    }

    let function_code = body[1];
    if function_code == READ_HOLDING_REGISTERS | EXCEPTION_FLAG {
        return Err(ModbusError::ProtocolException {
            code: ExceptionCode::from(body[2]),
        });
    }
    if function_code != READ_HOLDING_REGISTERS {
        return Err(ModbusError::MalformedResponse(format!(
            "unexpected function code 0x{:02x}",
            function_code
        )));
    }

    let byte_count = body[2] as usize;
    let payload = &body[3..];
    if payload.len() != byte_count {
        return Err(ModbusError::MalformedResponse(format!(
            "byte count {} but {} payload bytes",
            byte_count,
            payload.len()
        )));
    }
    if byte_count != count as usize * 2 {
        return Err(ModbusError::MalformedResponse(format!(
            "expected {} registers, got {}",
            count,
            byte_count / 2
        )));
    }

    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Total frame length announced by a (possibly partial) reply buffer,
/// or `None` while the header needed to tell is still incomplete.
pub fn rtu_frame_len(buffer: &[u8]) -> Option<usize> {
    let function_code = *buffer.get(1)?;
    if function_code & EXCEPTION_FLAG != 0 {
        return Some(EXCEPTION_FRAME_LEN);
    }
    let byte_count = *buffer.get(2)? as usize;
    Some(3 + byte_count + CRC_LEN)
}
