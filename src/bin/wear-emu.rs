//! Thin CLI front-end over `EmulatorCore`: load a package/ELF (or boot the
//! internal diagnostic BIOS with no argument), run it headlessly, and
//! print guest log lines to stdout until interrupted.
//!
//! Rust-internal diagnostics go through `log`/`env_logger`, completely
//! separate from the guest-facing `Logger` callback the core itself uses
//! (spec §0/§9: the two log streams serve different audiences and should
//! not be conflated).

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wear_emu::{EmuState, EmulatorCore, EmulatorSpecs, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "wear-emu", about = "Guest execution substrate CLI")]
struct Cli {
    /// Path to a package or raw ELF64 executable. Boots the internal
    /// diagnostic BIOS instead when omitted.
    game: Option<PathBuf>,

    /// Minimum severity a guest log line must carry to be printed.
    #[arg(long, value_enum, default_value = "info")]
    log_level: CliLogLevel,

    /// Extra guest-path-prefix=host-directory mounts, may be repeated.
    #[arg(long = "mount", value_parser = parse_mount)]
    mounts: Vec<(String, PathBuf)>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl From<CliLogLevel> for LogLevel {
    fn from(v: CliLogLevel) -> Self {
        match v {
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Warning => LogLevel::Warning,
            CliLogLevel::Error => LogLevel::Error,
        }
    }
}

fn parse_mount(s: &str) -> Result<(String, PathBuf), String> {
    let (prefix, host) = s
        .split_once('=')
        .ok_or_else(|| format!("expected prefix=host-path, got '{s}'"))?;
    Ok((prefix.to_string(), PathBuf::from(host)))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let specs = EmulatorSpecs {
        log_level: cli.log_level.into(),
        extra_mounts: cli.mounts,
        ..Default::default()
    };

    let core = match EmulatorCore::initialize(specs) {
        Ok(core) => core,
        Err(e) => {
            error!("failed to initialize emulator core: {e}");
            std::process::exit(1);
        }
    };

    core.set_log_callback(Arc::new(|level, component, message| {
        println!("[{}][{}] {}", level.as_str(), component, message);
    }));

    let load_result = match &cli.game {
        Some(path) => core.load_game(path),
        None => {
            info!("no game path given, booting internal diagnostic BIOS");
            core.load_internal_bios()
        }
    };

    let entry = match load_result {
        Ok(entry) => entry,
        Err(e) => {
            error!("failed to load guest program: {e}");
            std::process::exit(1);
        }
    };
    info!("entry point 0x{entry:x}");

    if let Err(e) = core.run() {
        error!("failed to start guest execution: {e}");
        std::process::exit(1);
    }

    loop {
        std::thread::sleep(Duration::from_millis(250));
        if matches!(core.state(), EmuState::Error(_)) {
            error!("guest entered error state: {:?}", core.state());
            break;
        }
    }

    core.shutdown();
}
