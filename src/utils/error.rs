use std::fmt;
use thiserror::Error;

/// Exception codes a slave reports in a Modbus exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    SlaveDeviceFailure,
    Acknowledge,
    SlaveDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Other(u8),
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::SlaveDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::SlaveDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Other(other),
        }
    }
}

impl ExceptionCode {
    pub fn code(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::SlaveDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::SlaveDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailedToRespond => 0x0B,
            ExceptionCode::Other(code) => *code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::SlaveDeviceFailure => "slave device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::SlaveDeviceBusy => "slave device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => "gateway target failed to respond",
            ExceptionCode::Other(_) => "unknown exception",
        };
        write!(f, "0x{:02x} ({})", self.code(), description)
    }
}

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("CRC checksum mismatch: expected 0x{expected:04x}, received 0x{received:04x}")]
    CrcError { expected: u16, received: u16 },

    #[error("Device rejected request with exception {code}")]
    ProtocolException { code: ExceptionCode },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Communication failed after {attempts} attempt(s): {source}")]
    CommunicationError {
        attempts: u32,
        #[source]
        source: Box<ModbusError>,
    },

    #[error("Unknown register: address {0}")]
    UnknownRegister(u16),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ModbusError {
    /// Transient faults the master retries locally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModbusError::Timeout | ModbusError::CrcError { .. })
    }

    /// Faults after which the connection has to be reopened.
    pub fn is_fatal(&self) -> bool {
        match self {
            ModbusError::ConnectionError(_) | ModbusError::IoError(_) => true,
            ModbusError::CommunicationError { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl ModbusError {
    /// Bad requests or settings: retrying or moving on to the next sample
    /// cannot fix these.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ModbusError::InvalidArgument(_) | ModbusError::UnknownRegister(_) | ModbusError::ConfigError(_)
        )
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ModbusError::Timeout,
            _ => ModbusError::IoError(err.to_string()),
        }
    }
}

impl From<serialport::Error> for ModbusError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => ModbusError::ConnectionError(err.to_string()),
            _ => ModbusError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML error: {}", err))
    }
}
