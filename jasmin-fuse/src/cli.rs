use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    /// Disk image
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a blank volume, overwriting the image
    Format {
        /// 1 or 2
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
        sides: u8,

        #[arg(long, short, default_value = "")]
        label: String,
    },

    /// List the root directory
    Ls,

    /// Show the volume label and free space
    Info,

    /// Copy a host file onto the volume, replacing any file of the same name
    Put {
        source: PathBuf,

        /// Name on the volume, defaults to the source file name
        #[arg(long, short)]
        name: Option<String>,

        /// Store as a system file
        #[arg(long, requires = "load")]
        system: bool,

        /// Load address, e.g. 0x0500
        #[arg(long, value_parser = parse_address)]
        load: Option<u16>,

        /// Run address, defaults to the load address
        #[arg(long, value_parser = parse_address)]
        run: Option<u16>,

        #[arg(long)]
        lock: bool,
    },

    /// Copy a file from the volume to the host
    Get {
        name: String,

        /// Defaults to the name on the volume
        target: Option<PathBuf>,
    },

    /// Delete a file
    Rm { name: String },

    /// Cross-check the bitmap against every file chain
    Check,
}

/// 十进制，或带`0x`/`$`前缀的十六进制
fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|err| format!("invalid address {s:?}: {err}"))
}
