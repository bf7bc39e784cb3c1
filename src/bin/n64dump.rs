//! `n64dump` — dump a window of N64 cartridge ROM to a file.

use clap::Parser;
use n64_cart_reader::RomSession;
use std::fs::File;
use std::io::Write;

/// Dump N64 cartridge ROM over a USB-attached FT2232H.
#[derive(Parser)]
#[command(name = "n64dump", version, about)]
struct Args {
    /// Starting cartridge address. Accepts decimal or `0x`-prefixed hex.
    #[arg(value_parser = parse_address)]
    address: u32,

    /// Number of kibibytes to read, rounded up to a whole number of
    /// 512-byte windows.
    size_kb: u32,

    /// Output file. Defaults to `dump_<address>_<size-kb>kb.bin`.
    #[arg(short, long)]
    out: Option<String>,
}

fn parse_address(s: &str) -> Result<u32, String> {
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else {
        s.parse::<i64>()
    }
    .map_err(|e| format!("invalid address {s:?}: {e}"))?;
    u32::try_from(value).map_err(|_| format!("address {s:?} does not fit in 32 bits"))
}

const WINDOW: usize = 512;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let total_bytes = args.size_kb as usize * 1024;
    let windows = total_bytes.div_ceil(WINDOW).max(1);
    let out_path = args
        .out
        .unwrap_or_else(|| format!("dump_{:08x}_{}kb.bin", args.address, args.size_kb));

    let mut session = RomSession::open()?;
    let (chip_type, vendor_id, product_id) = session.device_info();
    log::info!("opened {chip_type:?} ({vendor_id:#06x}:{product_id:#06x})");

    let mut file = File::create(&out_path)?;
    for i in 0..windows {
        let addr = args.address + (i * WINDOW) as u32;
        let window = session.read512(addr)?;
        file.write_all(&window)?;
    }
    session.close()?;

    log::info!("wrote {} byte(s) to {out_path}", windows * WINDOW);
    Ok(())
}
