//! C9 — HLE Module Set: handlers registered with the System-Call
//! Dispatcher implementing filesystem, audio, input, module-loader,
//! debug-print, and graphics-submit semantics.
//!
//! Each submodule's handler bodies are grounded on the teacher's
//! `kernel/src/syscall/mod.rs::handle_full` match arms (argument shapes,
//! errno sign convention), retargeted at this crate's own subsystems.

pub mod audio;
pub mod debug;
pub mod fs;
pub mod gnm;
pub mod input;
pub mod misc;
pub mod module;

use crate::audio::AudioPortRegistry;
use crate::cpu::CpuHandle;
use crate::gpu::{GpuCommandParser, RenderCommandQueue};
use crate::input::InputRegistry;
use crate::logger::Logger;
use crate::syscall::SyscallDispatcher;
use crate::vfs::VirtualFileSystem;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Shared handles every HLE handler closure captures by `Arc` clone. This
/// is the dependency-injection payload the Emulator Core hands to
/// `register_all` at initialization (spec §9: no hidden globals).
#[derive(Clone)]
pub struct HleContext {
    pub vfs: Arc<VirtualFileSystem>,
    pub audio: Arc<AudioPortRegistry>,
    pub input: Arc<InputRegistry>,
    pub gpu_parser: Arc<Mutex<GpuCommandParser>>,
    pub render_queue: Arc<RenderCommandQueue>,
    pub logger: Logger,
    pub modules: Arc<Mutex<Vec<module::ModuleInfo>>>,
    /// Set by `sys_exit` for telemetry; the interpreter is actually
    /// stopped through `cpu_handle` below, since the CPU thread's
    /// `run_loop` only checks its own lock-free stop flag between
    /// instructions (spec §4.3 Exit-class syscalls, §5 cancellation).
    pub exit_requested: Arc<AtomicBool>,
    pub cpu_handle: CpuHandle,
}

impl HleContext {
    pub fn new(
        vfs: Arc<VirtualFileSystem>,
        audio: Arc<AudioPortRegistry>,
        input: Arc<InputRegistry>,
        gpu_parser: Arc<Mutex<GpuCommandParser>>,
        render_queue: Arc<RenderCommandQueue>,
        logger: Logger,
        cpu_handle: CpuHandle,
    ) -> Self {
        Self {
            vfs,
            audio,
            input,
            gpu_parser,
            render_queue,
            logger,
            modules: Arc::new(Mutex::new(Vec::new())),
            exit_requested: Arc::new(AtomicBool::new(false)),
            cpu_handle,
        }
    }
}

/// Registers every HLE handler's syscall number with the dispatcher.
pub fn register_all(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    fs::register(dispatcher, ctx);
    audio::register(dispatcher, ctx);
    input::register(dispatcher, ctx);
    module::register(dispatcher, ctx);
    debug::register(dispatcher, ctx);
    gnm::register(dispatcher, ctx);
    misc::register(dispatcher, ctx);
}
