//! Modbus RTU logger for the Grin PhaseRunner motor controller.
//!
//! Frames and checks function 0x03 requests, talks to the controller over a
//! serial port with bounded retries, and decodes register blocks through a
//! JSON register dictionary into timestamped CSV or JSON rows.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod registers;
pub mod sampler;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use modbus::{ModbusClient, ModbusClientTrait};
pub use output::{CsvFormatter, DataFormatter, DataSender, JsonFormatter};
pub use registers::{DecodedValue, RegisterDictionary, RegisterMeta};
pub use sampler::{BulkSampler, SamplePlan, SampleRow};
pub use services::SamplingService;
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
