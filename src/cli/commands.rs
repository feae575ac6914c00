use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use log::info;
use tokio::sync::watch;

use crate::config::Config;
use crate::modbus::transport::available_ports;
use crate::registers::RegisterDictionary;
use crate::services::{SampleMode, SamplingService};

pub fn build_cli() -> Command {
    Command::new("phaserunner")
        .version(crate::VERSION)
        .about("Read values from the Grin PhaseRunner controller for logging")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("tty")
                .short('t')
                .long("tty")
                .value_name("DEVICE")
                .global(true)
                .help("Serial (USB) device [default: /dev/ttyUSB0]"),
        )
        .arg(
            Arg::new("baudrate")
                .short('b')
                .long("baudrate")
                .value_name("BAUD")
                .value_parser(value_parser!(u32).range(1..))
                .global(true)
                .help("Serial port baudrate [default: 115200]"),
        )
        .arg(
            Arg::new("slave-id")
                .short('s')
                .long("slave-id")
                .value_name("ID")
                .value_parser(value_parser!(u8).range(1..=247))
                .global(true)
                .help("Modbus slave ID [default: 1]"),
        )
        .arg(
            Arg::new("dictionary-file")
                .short('d')
                .long("dictionary-file")
                .value_name("FILE")
                .global(true)
                .help("JSON register dictionary [default: BODm.json]"),
        )
        .arg(
            Arg::new("loop")
                .short('l')
                .long("loop")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .conflicts_with("forever")
                .global(true)
                .help("Sample N times [default: 10]"),
        )
        .arg(
            Arg::new("forever")
                .long("forever")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Sample until interrupted"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .value_parser(value_parser!(u64).range(1..))
                .global(true)
                .help("Milliseconds between samples [default: 200]"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_parser(["csv", "json"])
                .global(true)
                .help("Output format [default: csv]"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .global(true)
                .help("Directory for the log file [default: .]"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Do not echo samples to stdout"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Debug logging, including frame dumps"),
        )
        .subcommand(
            Command::new("read-register")
                .about("Read a single or multiple adjacent registers from an address")
                .arg(
                    Arg::new("address")
                        .required(true)
                        .value_parser(value_parser!(u16)),
                )
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .value_parser(value_parser!(u16).range(1..=125))
                        .default_value("1")
                        .help("Number of registers to read starting at the address"),
                ),
        )
        .subcommand(
            Command::new("read-bulk")
                .about("Read the configured register range plus misc registers, decoded"),
        )
        .subcommand(Command::new("list-ports").about("List available serial ports"))
        .subcommand(
            Command::new("save-config")
                .about("Write the effective configuration to a TOML file")
                .arg(Arg::new("file").required(true).value_name("FILE")),
        )
}

/// Defaults, then the `--config` file if given, then CLI flags.
pub fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_matches(matches)?;
    config.validate()?;
    Ok(config)
}

pub async fn handle_subcommand(name: &str, matches: &ArgMatches) -> Result<()> {
    match name {
        "list-ports" => return list_ports(),
        "save-config" => return save_config(matches),
        _ => {}
    }

    let mode = match name {
        "read-register" => {
            let start = *matches
                .get_one::<u16>("address")
                .context("missing register address")?;
            let count = *matches.get_one::<u16>("count").unwrap_or(&1);
            info!("🔍 Reading {} register(s) from address {}", count, start);
            SampleMode::RawRange { start, count }
        }
        "read-bulk" => {
            info!("🔍 Reading bulk register set");
            SampleMode::Bulk
        }
        other => bail!("unknown command '{}'", other),
    };

    let config = load_config(matches)?;
    let dictionary = RegisterDictionary::from_file(&config.dictionary_file)
        .with_context(|| format!("loading register dictionary {}", config.dictionary_file))?;
    let mut service = SamplingService::from_config(&config, dictionary)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Interrupt received, finishing current sample");
            let _ = shutdown_tx.send(true);
        }
    });

    let stats = service.run(mode, config.loop_count, shutdown_rx).await?;
    let client_stats = service.client().stats();
    info!("📊 Final Statistics:");
    info!("   ✅ Rows written: {}", stats.rows);
    info!("   ❌ Failed samples: {}", stats.failed);
    info!(
        "   🔁 Transactions: {}, attempts: {}, retries: {}",
        client_stats.transactions, client_stats.attempts, client_stats.retries
    );
    info!(
        "   ⏰ Timeouts: {}, CRC errors: {}, exceptions: {}",
        client_stats.timeouts, client_stats.crc_errors, client_stats.exceptions
    );
    Ok(())
}

fn save_config(matches: &ArgMatches) -> Result<()> {
    let path = matches
        .get_one::<String>("file")
        .context("missing output file")?;
    let config = load_config(matches)?;
    config
        .save_to_file(path)
        .with_context(|| format!("writing configuration to {}", path))?;
    info!("💾 Configuration saved to {}", path);
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("⚠️  No serial ports found");
        return Ok(());
    }

    println!("📡 Available Serial Ports:");
    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port.port_name);
        if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
            if let Some(manufacturer) = &usb_info.manufacturer {
                println!("      📱 Manufacturer: {}", manufacturer);
            }
            if let Some(product) = &usb_info.product {
                println!("      🏷️  Product: {}", product);
            }
            if let Some(serial_number) = &usb_info.serial_number {
                println!("      🔢 Serial Number: {}", serial_number);
            }
        }
    }
    Ok(())
}
