use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use tracing::{error, info};

use crate::core::config::Config;
use crate::core::emu::{EMU_BUILD_DATE_TIME, EMU_NAME, EMU_VERSION, Emulator};
use crate::core::interrupt;
use crate::core::memory::MemoryImage;
use crate::log::Logger;

mod core;
mod log;
mod term;

/// Interactive emulator and debugger for the Proto 16-bit processor.
#[derive(Parser, Debug)]
#[command(name = "r-proto", version)]
struct Args {
    /// Memory image to execute: raw little-endian 16-bit words
    image: PathBuf,

    /// Optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable every interactive feature and run straight through
    #[arg(long)]
    dummy: bool,

    /// Strip color tags instead of emitting terminal escapes
    #[arg(long)]
    no_colors: bool,

    /// Initial log filter, e.g. "info" or "r_proto=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    let logger = Logger::new(&args.log_level);

    let mut config = match &args.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid configuration: {e}");
                exit(1);
            }
        },
        None => Config::default(),
    };
    if args.dummy {
        config.dummy_mode = true;
    }
    if args.no_colors {
        config.enable_colors = false;
    }
    term::set_colors_enabled(config.enable_colors);

    info!(
        "Welcome to {} v{} compiled on {}",
        EMU_NAME, EMU_VERSION, EMU_BUILD_DATE_TIME
    );

    let image_path = args.image.display().to_string();
    let image = match MemoryImage::load_from_file(&image_path) {
        Ok(image) => image,
        Err(e) => {
            error!("Error while loading memory image {image_path}: {e}");
            exit(1);
        }
    };
    info!("Loaded memory image {image_path}");
    info!("Image MD5: {}", image.md5);

    let mut memory = image.words;
    let mut emu = Emulator::new(&mut memory, &config);
    emu.set_logger(logger);

    if config.install_sigint_handler && !config.dummy_mode {
        if let Err(e) = interrupt::install_handler(emu.break_request()) {
            error!("Unable to install the interrupt handler: {e}");
        }
    }

    exit(emu.run());
}
