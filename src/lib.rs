//! wear-emu — guest execution substrate for a PS4-class console emulator.
//!
//! This crate is the headless core: memory, CPU interpretation, the
//! syscall dispatcher and its HLE handlers, a software GPU command
//! parser, a virtual filesystem, audio/input registries, and an
//! executable loader, all wired together by `EmulatorCore`. It owns no
//! window, no audio device, and no input backend — a host application
//! supplies those through the registries' `Sink`/`Source` traits and
//! drives the guest lifecycle through `EmulatorCore`'s public API.

pub mod audio;
pub mod cpu;
pub mod emulator;
pub mod error;
pub mod gpu;
pub mod input;
pub mod loader;
pub mod logger;
pub mod memory;
pub mod syscall;
pub mod vfs;

pub use emulator::{EmuState, EmulatorCore, EmulatorSpecs};
pub use error::EmulatorError;
pub use logger::{LogCallback, LogLevel};
