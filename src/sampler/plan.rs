use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::modbus::protocol::MAX_READ_REGISTERS;
use crate::utils::error::ModbusError;

/// Which registers make up one sample: a contiguous range followed by
/// individually read ("sparse") addresses, in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplePlan {
    range_start: u16,
    range_count: u16,
    sparse: Vec<u16>,
}

impl SamplePlan {
    /// A `range_count` of zero samples the sparse addresses only; the range
    /// is read in one transaction, so it holds at most 125 registers.
    ///
    /// Overlap between range and sparse addresses, or a sparse address
    /// listed twice, is rejected: which reading should win is ambiguous.
    pub fn new(range_start: u16, range_count: u16, sparse: Vec<u16>) -> Result<Self, ModbusError> {
        if range_count > MAX_READ_REGISTERS {
            return Err(ModbusError::InvalidArgument(format!(
                "range of {} registers exceeds the {} register read limit",
                range_count, MAX_READ_REGISTERS
            )));
        }

        let range_end = range_start as u32 + range_count as u32;
        if range_end > 0x1_0000 {
            return Err(ModbusError::InvalidArgument(format!(
                "range {} + {} runs past the last register address",
                range_start, range_count
            )));
        }

        let mut seen = HashSet::with_capacity(sparse.len());
        for &address in &sparse {
            if (range_start as u32..range_end).contains(&(address as u32)) {
                return Err(ModbusError::InvalidArgument(format!(
                    "sparse address {} overlaps range {}..{}",
                    address, range_start, range_end
                )));
            }
            if !seen.insert(address) {
                return Err(ModbusError::InvalidArgument(format!(
                    "sparse address {} listed more than once",
                    address
                )));
            }
        }

        if range_count == 0 && sparse.is_empty() {
            return Err(ModbusError::InvalidArgument("sample plan selects no registers".to_string()));
        }

        Ok(Self {
            range_start,
            range_count,
            sparse,
        })
    }

    pub fn range_start(&self) -> u16 {
        self.range_start
    }

    pub fn range_count(&self) -> u16 {
        self.range_count
    }

    pub fn sparse(&self) -> &[u16] {
        &self.sparse
    }

    pub fn range_addresses(&self) -> impl Iterator<Item = u16> {
        let start = self.range_start as u32;
        (start..start + self.range_count as u32).map(|address| address as u16)
    }

    /// Every address in row order: the range ascending, then sparse as declared.
    pub fn addresses(&self) -> Vec<u16> {
        self.range_addresses()
            .chain(self.sparse.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.range_count as usize + self.sparse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
