pub mod client;
pub mod protocol;
pub mod crc;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ClientConfig, ClientStats, ModbusClient, ModbusClientTrait, RetryPolicy, TransactionState};
pub use protocol::{decode_response, encode_read_holding_registers, ModbusRequest, MAX_READ_REGISTERS};
pub use crc::crc16_modbus;
pub use transport::{SerialTransport, Transport};
