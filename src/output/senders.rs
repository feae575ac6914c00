use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::error::ModbusError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ModbusError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        println!("{}", data);
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends one line per `send` to a log file.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// `<directory>/<prefix>.<YYYY-mm-dd_HH-MM-SS>.<extension>`, creating the directory.
    pub fn timestamped<P: AsRef<Path>>(
        directory: P,
        prefix: &str,
        extension: &str,
        started: DateTime<Utc>,
    ) -> Result<Self, ModbusError> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory).map_err(|e| {
            ModbusError::IoError(format!("cannot create {}: {}", directory.display(), e))
        })?;

        let file_name = format!("{}.{}.{}", prefix, started.format("%Y-%m-%d_%H-%M-%S"), extension);
        let path: PathBuf = directory.join(file_name);
        info!("📝 Logging samples to {}", path.display());
        Ok(Self::new(path))
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        debug!("📝 Writing {} bytes to {}", data.len(), self.file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.file_path, e);
                ModbusError::IoError(format!("File open error: {}", e))
            })?;

        writeln!(file, "{}", data).map_err(|e| {
            error!("❌ Failed to write to file {}: {}", self.file_path, e);
            ModbusError::IoError(format!("File write error: {}", e))
        })?;

        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}
