use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use colored::Colorize;
use tagglue::{
    boundary::HostConvention,
    cl_backend::DEFAULT_TRIPLE,
    target::{Endianness, TargetInfo},
};
use tracing_subscriber::EnvFilter;

mod driver;

#[derive(Parser)]
#[command(
    name = "tagglue",
    version,
    about = "Sum type layout and host boundary glue generator"
)]
pub struct Cli {
    /// Resolved types and entry points (JSON)
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    input: PathBuf,

    /// Target triple for object emission
    #[arg(long, default_value = DEFAULT_TRIPLE)]
    target: String,

    /// Pointer width in bytes
    #[arg(long, default_value_t = 8, value_parser = parse_pointer_width)]
    pointer_width: u32,

    /// Encode discriminants and boundary chunks big-endian
    #[arg(long, default_value_t = false)]
    big_endian: bool,

    /// Sum values larger than this many bytes are passed by pointer
    #[arg(long, default_value_t = 16)]
    max_by_value_size: u32,

    /// Widest discriminant in bytes the host accepts
    #[arg(long, default_value_t = 4)]
    max_discriminant_width: u32,

    /// Largest alignment in bytes the host accepts
    #[arg(long, default_value_t = 16)]
    max_alignment: u32,

    /// Accept discriminants at offsets that are not a multiple of their width
    #[arg(long, default_value_t = false)]
    allow_unaligned_discriminant: bool,

    /// Write an object file with glue functions and boundary thunks
    #[arg(long, value_name = "PATH")]
    emit: Option<PathBuf>,

    /// Print computed layouts
    #[arg(long, default_value_t = false)]
    print_layouts: bool,

    /// Print generated glue functions
    #[arg(long, default_value_t = false)]
    print_glue: bool,

    /// More logging; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn target_info(&self) -> TargetInfo {
        let endianness = if self.big_endian {
            Endianness::Big
        } else {
            Endianness::Little
        };
        TargetInfo::new(self.pointer_width, endianness)
    }

    fn convention(&self) -> HostConvention {
        HostConvention {
            target: self.target_info(),
            max_by_value_size: self.max_by_value_size,
            max_discriminant_width: self.max_discriminant_width,
            max_alignment: self.max_alignment,
            require_aligned_discriminant: !self.allow_unaligned_discriminant,
        }
    }
}

fn parse_pointer_width(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(w @ (4 | 8)) => Ok(w),
        _ => Err(format!("`{s}` is not a pointer width; use 4 or 8")),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tagglue={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point, parses command line arguments and runs the pipeline.
pub fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match driver::run(&cli) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {e}", "internal error:".red().bold());
            ExitCode::from(2)
        }
    }
}
