use async_trait::async_trait;
use bytes::BytesMut;
use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort, SerialPortInfo};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use super::protocol::rtu_frame_len;
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

// Upper bound for a single blocking read on the port.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 256;

/// One blocking request/response exchange on an exclusively owned link.
///
/// `&mut self` keeps a single exchange in flight per connection.
#[async_trait]
pub trait Transport: Send {
    async fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, ModbusError>;

    fn description(&self) -> String;
}

pub struct SerialTransport {
    // Moved onto a blocking thread for the duration of each exchange.
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", config.port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, {:?} parity, 1 stop bit",
            config.baud_rate, config.parity
        );

        let parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(POLL_INTERVAL)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.port, e);
                ModbusError::ConnectionError(format!("Failed to open port {}: {}", config.port, e))
            })?;

        info!("✅ Modbus RTU connection established successfully");
        Ok(Self::from_port(port, &config.port, config.baud_rate))
    }

    /// Wraps an already opened port.
    pub fn from_port(port: Box<dyn SerialPort>, port_name: &str, baud_rate: u32) -> Self {
        Self {
            port: Some(port),
            port_name: port_name.to_string(),
            baud_rate,
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let mut port = self.port.take().ok_or_else(|| {
            ModbusError::ConnectionError(format!("{} lost after a failed exchange", self.port_name))
        })?;
        let request = request.to_vec();
        let port_name = self.port_name.clone();

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = exchange_blocking(port.as_mut(), &port_name, &request, timeout);
            (port, result)
        })
        .await
        .map_err(|e| ModbusError::IoError(format!("Serial worker failed: {}", e)))?;

        self.port = Some(port);
        result
    }

    fn description(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!("🔌 Closing serial port {}", self.port_name);
    }
}

/// Writes `request` and collects reply bytes until `rtu_frame_len` is
/// satisfied. Bytes past the frame are dropped; a frame still incomplete
/// at the deadline is a `Timeout`.
fn exchange_blocking(
    port: &mut dyn SerialPort,
    port_name: &str,
    request: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ModbusError> {
    // Drop stale bytes left over from an earlier, abandoned exchange.
    port.clear(ClearBuffer::Input)
        .map_err(|e| ModbusError::IoError(format!("Clear failed: {}", e)))?;

    debug!("📤 Sending frame: [{}]", hex::encode(request));
    port.write_all(request)
        .map_err(|e| ModbusError::IoError(format!("Write failed: {}", e)))?;
    port.flush()
        .map_err(|e| ModbusError::IoError(format!("Flush failed: {}", e)))?;

    let deadline = Instant::now() + timeout;
    let mut response = BytesMut::with_capacity(READ_CHUNK);
    let mut buffer = [0u8; READ_CHUNK];

    loop {
        if let Some(frame_len) = rtu_frame_len(&response) {
            if response.len() >= frame_len {
                response.truncate(frame_len);
                debug!("📥 Complete response: [{}]", hex::encode(&response));
                return Ok(response.to_vec());
            }
        }

        if Instant::now() >= deadline {
            if !response.is_empty() {
                warn!(
                    "⏰ Incomplete frame on {} at timeout: [{}]",
                    port_name,
                    hex::encode(&response)
                );
            }
            return Err(ModbusError::Timeout);
        }

        match port.read(&mut buffer) {
            Ok(0) => std::thread::sleep(POLL_INTERVAL),
            Ok(n) => response.extend_from_slice(&buffer[..n]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                error!("❌ Read error on {}: {}", port_name, e);
                return Err(ModbusError::IoError(format!("Read failed: {}", e)));
            }
        }
    }
}

pub fn available_ports() -> Result<Vec<SerialPortInfo>, ModbusError> {
    Ok(serialport::available_ports()?)
}
