use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use ch559isp::{Chip, FlashOptions, Flashing, transport::UsbTransport};

#[derive(clap::Parser)]
#[command(
    name = "CH559 ISP CLI",
    about = "Command-line flasher for the CH559 USB bootloader"
)]
struct Cli {
    /// Index of the bootloader device when more than one is attached
    #[arg(long, short, default_value_t = 0)]
    device: usize,

    /// USB transfer timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Accept the 0xfe result on a final short block (old 2.3x bootloaders)
    #[arg(long)]
    legacy_ack: bool,

    /// Turn debugging information on
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List attached bootloaders
    List {},
    /// Get info about current connected chip
    Info {},
    /// Start the application
    Reset {},
    /// Erase code flash
    Erase {
        /// Number of 1KiB blocks, the whole code flash by default
        #[arg(long)]
        blocks: Option<u8>,
    },
    /// Erase, download to code flash, verify and reset
    Flash {
        /// The path to the file to be downloaded to the code flash
        path: String,
        /// Skip the erase step
        #[arg(long)]
        no_erase: bool,
        /// Skip the verify step
        #[arg(long)]
        no_verify: bool,
        /// Stay in the bootloader afterwards
        #[arg(long)]
        no_reset: bool,
    },
    /// Verify code flash content
    Verify { path: String },
    /// Erase data flash
    EraseData {},
    /// Write a file into data flash
    WriteData {
        path: String,
        /// Offset from the data flash base
        #[arg(long, default_value_t = 0, value_parser = parse_u16)]
        offset: u16,
    },
    /// Dump data flash
    ReadData {
        #[arg(long, default_value_t = 0, value_parser = parse_u16)]
        offset: u16,
        #[arg(long, default_value_t = 1024)]
        len: usize,
    },
    /// Rewrite the config high byte. Can brick the bootloader entry!
    Config {
        #[arg(value_parser = parse_u8)]
        high: u8,
    },
}

fn parse_u16(s: &str) -> Result<u16, String> {
    parse_int(s).and_then(|n| u16::try_from(n).map_err(|e| e.to_string()))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    parse_int(s).and_then(|n| u8::try_from(n).map_err(|e| e.to_string()))
}

fn parse_int(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(h) => u32::from_str_radix(h, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())
}

fn progress_bar(len: usize, msg: &'static str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg:8} [{bar:40.cyan/blue}] {pos:>6}/{len:6} bytes")?
            .progress_chars("=> "),
    );
    bar.set_message(msg);
    Ok(bar)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if let Commands::List {} = cli.command {
        let chip = Chip::ch559()?;
        let n = UsbTransport::scan_devices(chip.vendor_id, chip.product_id)?;
        log::info!("Found {} CH55x bootloader device(s)", n);
        return Ok(());
    }

    let options = FlashOptions {
        legacy_short_block_ack: cli.legacy_ack,
        timeout: Duration::from_millis(cli.timeout_ms),
        ..Default::default()
    };
    let mut flashing = Flashing::new_from_usb(cli.device, options)?;

    match cli.command {
        Commands::List {} => {}
        Commands::Info {} => {
            flashing.dump_info()?;
        }
        Commands::Reset {} => {
            flashing.reset()?;
        }
        Commands::Erase { blocks } => {
            flashing.erase_code(blocks)?;
        }
        Commands::Flash {
            path,
            no_erase,
            no_verify,
            no_reset,
        } => {
            flashing.dump_info()?;
            let binary = ch559isp::format::read_firmware_from_file(path)?;
            log::info!("Firmware size: {}", binary.len());
            if !no_erase {
                flashing.erase_code(None)?;
            }
            let bar = progress_bar(binary.len(), "write")?;
            flashing.flash(&binary, |p| bar.set_position((p * binary.len() as f64) as u64))?;
            bar.finish();
            if !no_verify {
                let bar = progress_bar(binary.len(), "verify")?;
                flashing.verify(&binary, |p| bar.set_position((p * binary.len() as f64) as u64))?;
                bar.finish();
            }
            if !no_reset {
                flashing.reset()?;
            }
        }
        Commands::Verify { path } => {
            let binary = ch559isp::format::read_firmware_from_file(path)?;
            log::info!("Firmware size: {}", binary.len());
            let bar = progress_bar(binary.len(), "verify")?;
            flashing.verify(&binary, |p| bar.set_position((p * binary.len() as f64) as u64))?;
            bar.finish();
            log::info!("Verified!");
        }
        Commands::EraseData {} => {
            flashing.erase_data()?;
        }
        Commands::WriteData { path, offset } => {
            let binary = ch559isp::format::read_firmware_from_file(path)?;
            let bar = progress_bar(binary.len(), "data")?;
            flashing.write_data(offset, &binary, |p| {
                bar.set_position((p * binary.len() as f64) as u64)
            })?;
            bar.finish();
            flashing.verify_data(offset, &binary)?;
        }
        Commands::ReadData { offset, len } => {
            let data = flashing.read_data(offset, len)?;
            log::info!(
                "Data flash @ 0x{:04x}:",
                ch559isp::flashing::data_flash_address(offset)
            );
            let mut out = Vec::new();
            hxdmp::hexdump(&data, &mut out)?;
            println!("{}", String::from_utf8_lossy(&out));
        }
        Commands::Config { high } => {
            log::warn!("Writing config high byte 0x{:02x}", high);
            flashing.write_config(high)?;
        }
    }

    Ok(())
}
