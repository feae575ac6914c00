use chrono::Utc;
use log::{error, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::modbus::{ModbusClient, ModbusClientTrait};
use crate::config::settings::LoopCount;
use crate::output::{formatter_for, ConsoleSender, CsvFormatter, DataFormatter, DataSender, FileSender};
use crate::registers::RegisterDictionary;
use crate::sampler::{header, BulkSampler, SamplePlan};
use crate::utils::error::ModbusError;

/// What each tick reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// The configured range plus misc registers, decoded.
    Bulk,
    /// A contiguous range, undecoded.
    RawRange { start: u16, count: u16 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub rows: u64,
    pub failed: u64,
}

/// Drives the sampling cadence for one device and hands lines to the senders.
pub struct SamplingService<C: ModbusClientTrait = ModbusClient> {
    client: C,
    dictionary: RegisterDictionary,
    sampler: BulkSampler,
    interval: Duration,
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl SamplingService<ModbusClient> {
    /// Opens the serial port and wires formatter and senders from `config`.
    pub fn from_config(config: &Config, dictionary: RegisterDictionary) -> Result<Self, ModbusError> {
        config.validate()?;
        info!("🚀 Initializing sampling service");
        info!(
            "📡 Device {} on {} @ {} baud",
            config.slave_id, config.serial_port, config.baud_rate
        );

        let client = ModbusClient::connect(&config.serial_config(), config.client_config())?;
        let sampler = BulkSampler::new(config.slave_id, config.sample_plan()?);

        let mut service = Self::new(client, dictionary, sampler, config.sample_interval());
        service.set_formatter(formatter_for(config.output.format));
        if config.output.console {
            service.add_sender(Box::new(ConsoleSender));
        }
        service.add_sender(Box::new(FileSender::timestamped(
            &config.output.directory,
            &config.output.file_prefix,
            config.output.format.extension(),
            Utc::now(),
        )?));

        info!("✅ Sampling service initialized successfully");
        Ok(service)
    }
}

impl<C: ModbusClientTrait> SamplingService<C> {
    pub fn new(client: C, dictionary: RegisterDictionary, sampler: BulkSampler, interval: Duration) -> Self {
        Self {
            client,
            dictionary,
            sampler,
            interval,
            formatter: Box::new(CsvFormatter),
            senders: Vec::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn dictionary(&self) -> &RegisterDictionary {
        &self.dictionary
    }

    pub fn sampler(&self) -> &BulkSampler {
        &self.sampler
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Added {} sender to {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn set_formatter(&mut self, formatter: Box<dyn DataFormatter>) {
        self.formatter = formatter;
    }

    pub fn header(&self) -> Result<Vec<String>, ModbusError> {
        self.sampler.header(&self.dictionary)
    }

    /// Labels for a contiguous range, as printed above raw range rows.
    pub fn range_header(&self, start: u16, count: u16) -> Result<Vec<String>, ModbusError> {
        header(&self.dictionary, &SamplePlan::new(start, count, Vec::new())?)
    }

    pub async fn read_raw_range(&mut self, start: u16, count: u16) -> Result<Vec<u16>, ModbusError> {
        self.client
            .read_holding_registers(self.sampler.slave_id(), start, count)
            .await
    }

    /// Runs ticks until `loop_count` is used up or `shutdown` flips to true
    /// (dropping the sender also stops the run).
    ///
    /// A failed tick is logged and skipped; a fatal transport error or a
    /// bad request (invalid argument, unknown register) ends the run.
    pub async fn run(
        &mut self,
        mode: SampleMode,
        loop_count: LoopCount,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunStats, ModbusError> {
        let columns = match mode {
            SampleMode::Bulk => self.header()?,
            SampleMode::RawRange { start, count } => self.range_header(start, count)?,
        };
        if let Some(line) = self.formatter.format_header(&columns) {
            self.broadcast(&line).await;
        }

        info!("⏱️  Sampling every {:?}, {}", self.interval, loop_count);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = RunStats::default();

        while loop_count.allows(stats.ticks) {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                info!("🛑 Sampling cancelled after {} tick(s)", stats.ticks);
                break;
            }

            stats.ticks += 1;
            match self.tick(mode).await {
                Ok(line) => {
                    self.broadcast(&line).await;
                    stats.rows += 1;
                }
                Err(e) if e.is_fatal() || e.is_config_error() => {
                    error!("❌ Fatal error on tick {}: {}", stats.ticks, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("⚠️  Skipping tick {}: {}", stats.ticks, e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "📊 Sampling finished: {} tick(s), {} row(s), {} failed",
            stats.ticks, stats.rows, stats.failed
        );
        Ok(stats)
    }

    async fn tick(&mut self, mode: SampleMode) -> Result<String, ModbusError> {
        let timestamp = Utc::now();
        match mode {
            SampleMode::Bulk => {
                let row = self.sampler.sample(&mut self.client, &self.dictionary).await?;
                Ok(self.formatter.format_row(timestamp, &row))
            }
            SampleMode::RawRange { start, count } => {
                let values = self.read_raw_range(start, count).await?;
                Ok(self.formatter.format_raw(timestamp, &values))
            }
        }
    }

    async fn broadcast(&self, line: &str) {
        for sender in &self.senders {
            if let Err(e) = sender.send(line).await {
                error!(
                    "❌ Failed to send data via {} to {}: {}",
                    sender.sender_type(),
                    sender.destination(),
                    e
                );
            }
        }
    }
}
