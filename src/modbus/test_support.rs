//! Scripted transport and frame builders shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::crc::append_crc;
use super::protocol::{EXCEPTION_FLAG, READ_HOLDING_REGISTERS};
use super::transport::Transport;
use crate::utils::error::ModbusError;

pub fn read_response(slave_id: u8, values: &[u16]) -> Vec<u8> {
    let mut frame = vec![slave_id, READ_HOLDING_REGISTERS, (values.len() * 2) as u8];
    for value in values {
        frame.extend_from_slice(&value.to_be_bytes());
    }
    append_crc(&mut frame);
    frame
}

pub fn exception_response(slave_id: u8, code: u8) -> Vec<u8> {
    let mut frame = vec![slave_id, READ_HOLDING_REGISTERS | EXCEPTION_FLAG, code];
    append_crc(&mut frame);
    frame
}

/// Replays queued replies in order and records every request it sees.
/// Clones share state, so a test can keep a handle after handing one away.
#[derive(Clone, Default)]
pub struct MockTransport {
    responses: Arc<Mutex<VecDeque<Result<Vec<u8>, ModbusError>>>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, frame: Vec<u8>) {
        self.responses.lock().unwrap().push_back(Ok(frame));
    }

    pub fn push_error(&self, error: ModbusError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&mut self, request: &[u8], _timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        self.requests.lock().unwrap().push(request.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ModbusError::Timeout))
    }

    fn description(&self) -> String {
        "mock".to_string()
    }
}
