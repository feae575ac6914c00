use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::sleep;

use super::protocol::ModbusRequest;
use super::transport::{SerialTransport, Transport};
use crate::config::settings::SerialConfig;
use crate::utils::error::ModbusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub response_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Where the current transaction is. The client returns to `Idle`
/// once a transaction finishes either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Sending,
    AwaitingResponse,
    Validating,
    Done,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub transactions: u64,
    pub attempts: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub crc_errors: u64,
    pub exceptions: u64,
    pub failures: u64,
}

#[async_trait]
pub trait ModbusClientTrait: Send {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;
}

/// Modbus RTU master: one validated read per call, with bounded retry
/// on timeouts and CRC failures.
pub struct ModbusClient<T: Transport = SerialTransport> {
    transport: T,
    config: ClientConfig,
    state: TransactionState,
    stats: ClientStats,
}

impl ModbusClient<SerialTransport> {
    pub fn connect(serial: &SerialConfig, config: ClientConfig) -> Result<Self, ModbusError> {
        let transport = SerialTransport::open(serial)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> ModbusClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        info!(
            "📡 Modbus master on {} (timeout {:?}, {} attempt(s))",
            transport.description(),
            config.response_timeout,
            config.retry.max_attempts
        );
        Self {
            transport,
            config,
            state: TransactionState::Idle,
            stats: ClientStats::default(),
        }
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Reads `count` registers starting at `start_addr` under an explicit
    /// retry policy instead of the configured one.
    pub async fn read_holding_registers_with(
        &mut self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
        policy: &RetryPolicy,
    ) -> Result<Vec<u16>, ModbusError> {
        // Rejects zero, overlong and out-of-range requests before touching the bus.
        let request = ModbusRequest::read_holding_registers(slave_id, start_addr, count)?;
        let frame = request.encode();
        let max_attempts = policy.max_attempts.max(1);

        debug!(
            "📊 Reading {} registers from device {} starting at address {}",
            count, slave_id, start_addr
        );
        self.stats.transactions += 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.attempt(&request, &frame).await {
                Ok(values) => {
                    self.transition(TransactionState::Done);
                    self.transition(TransactionState::Idle);
                    return Ok(values);
                }
                Err(e) => e,
            };

            match &error {
                ModbusError::Timeout => self.stats.timeouts += 1,
                ModbusError::CrcError { .. } => self.stats.crc_errors += 1,
                ModbusError::ProtocolException { .. } => self.stats.exceptions += 1,
                _ => {}
            }

            if error.is_retryable() && attempt < max_attempts {
                warn!(
                    "⚠️  Device {} read at {} attempt {}/{} failed: {}",
                    slave_id, start_addr, attempt, max_attempts, error
                );
                self.stats.retries += 1;
                if !policy.backoff.is_zero() {
                    sleep(policy.backoff).await;
                }
                continue;
            }

            self.transition(TransactionState::Failed);
            self.transition(TransactionState::Idle);
            self.stats.failures += 1;

            return Err(if error.is_retryable() {
                ModbusError::CommunicationError {
                    attempts: attempt,
                    source: Box::new(error),
                }
            } else {
                error
            });
        }
    }

    async fn attempt(&mut self, request: &ModbusRequest, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
        self.transition(TransactionState::Sending);
        self.stats.attempts += 1;
        // The transport writes and then waits within the same call.
        self.transition(TransactionState::AwaitingResponse);
        let reply = self
            .transport
            .exchange(frame, self.config.response_timeout)
            .await?;
        self.transition(TransactionState::Validating);
        request.decode_response(&reply)
    }

    fn transition(&mut self, next: TransactionState) {
        log::trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[async_trait]
impl<T: Transport> ModbusClientTrait for ModbusClient<T> {
    async fn read_holding_registers(
        &mut self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        let policy = self.config.retry;
        self.read_holding_registers_with(slave_id, start_addr, count, &policy)
            .await
    }
}
