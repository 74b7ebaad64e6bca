//! melcard command line runner
//! Run APDUs against a simulated MEL card.
//!
//! Usage: `melcard --alu <file> [--config FILE] [--apdu HEX]... [--disassemble] [--trace]`

use anyhow::{bail, Context};
use clap::Parser;
use melcard::card::{MultosCard, Slot};
use melcard::config::CardConfig;
use melcard::disassembler::{disassemble, formatter, DisassemblyOptions};
use melcard::load_unit::LoadUnit;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "melcard")]
#[command(about = "Load an application load unit onto a simulated MEL card and exchange APDUs")]
struct Args {
    /// Application load unit to install
    #[arg(long)]
    alu: PathBuf,

    /// JSON card configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command APDU in hex, sent in order (repeatable)
    #[arg(long = "apdu")]
    apdus: Vec<String>,

    /// Print a listing of the application code before running
    #[arg(long)]
    disassemble: bool,

    /// Log every executed instruction and dump each command's memory trace as JSON
    #[arg(long)]
    trace: bool,
}

fn init_logging(trace: bool) {
    let default = if trace { "melcard=trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits in {text:?}");
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair)?;
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte {pair:?}"))
        })
        .collect()
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.trace);

    let mut config = match &args.config {
        Some(path) => CardConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CardConfig::default(),
    };
    config.trace |= args.trace;

    let image = fs::read(&args.alu).with_context(|| format!("reading {}", args.alu.display()))?;
    let unit = LoadUnit::parse(&image).with_context(|| format!("parsing {}", args.alu.display()))?;

    if args.disassemble {
        for instr in disassemble(&unit.code, DisassemblyOptions::default()) {
            println!("{}", formatter::format_line(&instr));
        }
    }

    let mut card = MultosCard::new(config)?;
    card.install(&unit)?;
    let atr = card.power_on()?;
    info!("ATR {}", hex(&atr));

    for text in &args.apdus {
        let command = parse_hex(text)?;
        println!(">> {}", hex(&command));
        match card.transmit(&command) {
            Ok(response) => println!("<< {}", hex(&response)),
            Err(err) => {
                error!("{err}");
                println!("<< error: {err}");
            }
        }

        if args.trace {
            let records = card.machine().memory().trace().records();
            serde_json::to_writer_pretty(std::io::stdout(), records)?;
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("00A40400").unwrap(), vec![0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(parse_hex("80 10:01 02").unwrap(), vec![0x80, 0x10, 0x01, 0x02]);
        assert!(parse_hex("ABC").is_err());
        assert!(parse_hex("ZZ").is_err());
    }
}
