pub mod error;

pub use error::{ExceptionCode, ModbusError};
