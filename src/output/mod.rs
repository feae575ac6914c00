pub mod formatters;
pub mod senders;

pub use formatters::{CsvFormatter, DataFormatter, JsonFormatter};
pub use senders::{ConsoleSender, DataSender, FileSender};

use crate::config::settings::OutputFormat;

pub fn formatter_for(format: OutputFormat) -> Box<dyn DataFormatter> {
    match format {
        OutputFormat::Csv => Box::new(CsvFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}
