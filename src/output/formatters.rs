use chrono::{DateTime, SecondsFormat, Utc};
use std::borrow::Cow;

use crate::sampler::SampleRow;

/// Turns sample rows into lines for a `DataSender`.
pub trait DataFormatter: Send + Sync {
    /// Line written once before any row; `None` when the format has no header.
    fn format_header(&self, columns: &[String]) -> Option<String>;
    fn format_row(&self, timestamp: DateTime<Utc>, row: &SampleRow) -> String;
    /// Undecoded register values, for the raw range command.
    fn format_raw(&self, timestamp: DateTime<Utc>, values: &[u16]) -> String;
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct CsvFormatter;

impl CsvFormatter {
    fn field(value: &str) -> Cow<'_, str> {
        if value.contains([',', '"', '\n', '\r']) {
            Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
        } else {
            Cow::Borrowed(value)
        }
    }
}

impl DataFormatter for CsvFormatter {
    fn format_header(&self, columns: &[String]) -> Option<String> {
        let mut line = String::from("Timestamp");
        for column in columns {
            line.push(',');
            line.push_str(&Self::field(column));
        }
        Some(line)
    }

    fn format_row(&self, timestamp: DateTime<Utc>, row: &SampleRow) -> String {
        let mut line = format_timestamp(timestamp);
        for sample in row.iter() {
            line.push(',');
            line.push_str(&Self::field(&sample.value.to_string()));
        }
        line
    }

    fn format_raw(&self, timestamp: DateTime<Utc>, values: &[u16]) -> String {
        let mut line = format_timestamp(timestamp);
        for value in values {
            line.push(',');
            line.push_str(&value.to_string());
        }
        line
    }
}

/// One JSON object per line.
pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_header(&self, _columns: &[String]) -> Option<String> {
        None // JSON lines are self-describing
    }

    fn format_row(&self, timestamp: DateTime<Utc>, row: &SampleRow) -> String {
        let json = serde_json::json!({
            "timestamp": format_timestamp(timestamp),
            "values": row,
        });
        json.to_string()
    }

    fn format_raw(&self, timestamp: DateTime<Utc>, values: &[u16]) -> String {
        let json = serde_json::json!({
            "timestamp": format_timestamp(timestamp),
            "raw": values,
        });
        json.to_string()
    }
}
