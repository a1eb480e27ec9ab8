//! C12 — Emulator Core: owns every subsystem, wires them together, and
//! drives the guest lifecycle (initialize -> load -> run -> pause/stop).
//!
//! Grounded on the teacher's `kernel/src/init.rs` ordered subsystem
//! bring-up and `kernel/src/linux_compat::run_binary`'s load-then-jump
//! shape, generalized from a single hard-coded boot path into a reusable
//! struct a host application drives (spec §9's dependency-injection
//! redesign: nothing here is a global, everything is a field).

use crate::audio::AudioPortRegistry;
use crate::cpu::decode::{RBP, RSP};
use crate::cpu::{CpuContext, CpuHandle, CpuInterpreter, SyscallInvoker};
use crate::error::EmulatorError;
use crate::gpu::{GpuCommandParser, RenderCommandQueue};
use crate::input::{InputRegistry, KeyMap};
use crate::logger::{LogCallback, LogLevel, Logger};
use crate::loader::ExecutableLoader;
use crate::memory::{GuestMemory, USER_BASE};
use crate::syscall::hle::{self, HleContext};
use crate::syscall::SyscallDispatcher;
use crate::vfs::VirtualFileSystem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Guest stack grows down from here; the top 4 KiB are left unused so an
/// initial push never lands exactly on the last valid arena byte.
const STACK_TOP_OFFSET: u64 = 0x1000;

/// Lifecycle states a driving application observes (spec §3/§4.10). Unlike
/// `cpu::CpuState`, which tracks the interpreter's own run loop, this is
/// the Emulator Core's outward-facing state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum EmuState {
    Idle,
    Booting,
    Running,
    Paused,
    Stopping,
    Error(String),
}

/// Configuration accepted by `EmulatorCore::initialize`. No config-file
/// format is mandated (spec §0); this is a plain struct a host
/// application fills in however it reads its own settings from.
pub struct EmulatorSpecs {
    pub log_level: LogLevel,
    pub key_map: KeyMap,
    pub extra_mounts: Vec<(String, PathBuf)>,
    pub audio_sink_factory: Option<Box<dyn Fn() -> Box<dyn crate::audio::Sink> + Send>>,
}

impl Default for EmulatorSpecs {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            key_map: KeyMap::Default,
            extra_mounts: Vec::new(),
            audio_sink_factory: None,
        }
    }
}

/// Adapts an `Arc<SyscallDispatcher>` into a `SyscallInvoker` without
/// requiring exclusive ownership of the `Arc` -- the dispatcher's own
/// interior mutability already makes `&self` sufficient (spec §9: virtual
/// dispatch via a boxed-closure table, not a `match`).
struct DispatcherInvoker(Arc<SyscallDispatcher>);

impl SyscallInvoker for DispatcherInvoker {
    fn invoke(&mut self, ctx: &mut CpuContext, mem: &mut GuestMemory) {
        use crate::cpu::decode::RAX;
        let result = self.0.dispatch(ctx, mem);
        ctx.set_reg(RAX, result.value as u64);
    }
}

pub struct EmulatorCore {
    logger: Logger,
    memory: Arc<Mutex<GuestMemory>>,
    interpreter: Arc<Mutex<CpuInterpreter>>,
    cpu_handle: CpuHandle,
    dispatcher: Arc<SyscallDispatcher>,
    vfs: Arc<VirtualFileSystem>,
    audio: Arc<AudioPortRegistry>,
    input: Arc<InputRegistry>,
    gpu_parser: Arc<Mutex<GpuCommandParser>>,
    render_queue: Arc<RenderCommandQueue>,
    hle_ctx: HleContext,
    loader: ExecutableLoader,
    state: Mutex<EmuState>,
    state_callback: Mutex<Option<Box<dyn Fn(EmuState) + Send>>>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    game_loaded: AtomicBool,
}

impl EmulatorCore {
    /// Ordered subsystem bring-up (spec §4.10): Guest Memory, then CPU
    /// Interpreter, then the Syscall Dispatcher wired with every HLE
    /// module, then Audio and Input reset to their idle states. Returns
    /// an `EmulatorCore` already sitting in `EmuState::Idle`; failure at
    /// any step aborts construction instead of leaving a half-built core
    /// around to transition into `Error` (the Rust idiom replacement of
    /// "Idle -> Error on failure" for construction-time failures).
    pub fn initialize(specs: EmulatorSpecs) -> Result<Self, EmulatorError> {
        let logger = Logger::new(specs.log_level);
        logger.info("emulator", "booting");

        let memory = GuestMemory::new(&logger)?;
        if memory.is_degraded() {
            logger.warning("emulator", "guest memory arena running in degraded capacity");
        }

        let interpreter = CpuInterpreter::new(logger.clone());
        let cpu_handle = interpreter.handle();
        let dispatcher = Arc::new(SyscallDispatcher::new(logger.clone()));

        let vfs = Arc::new(VirtualFileSystem::new());
        let audio = Arc::new(AudioPortRegistry::new());
        if let Some(factory) = specs.audio_sink_factory {
            audio.set_sink_factory(factory);
        }
        let input = Arc::new(InputRegistry::new(specs.key_map));
        let gpu_parser = Arc::new(Mutex::new(GpuCommandParser::new(logger.clone())));
        let render_queue = Arc::new(RenderCommandQueue::new());

        let hle_ctx = HleContext::new(
            vfs.clone(),
            audio.clone(),
            input.clone(),
            gpu_parser.clone(),
            render_queue.clone(),
            logger.clone(),
            cpu_handle.clone(),
        );
        hle::register_all(&dispatcher, &hle_ctx);
        logger.info(
            "emulator",
            &format!("registered {} syscall handlers", dispatcher.registered_count()),
        );

        for (prefix, root) in &specs.extra_mounts {
            if let Err(e) = vfs.mount(prefix, root) {
                logger.warning(
                    "emulator",
                    &format!("failed to mount {prefix} -> {}: {e}", root.display()),
                );
            }
        }

        let core = Self {
            logger: logger.clone(),
            memory: Arc::new(Mutex::new(memory)),
            interpreter: Arc::new(Mutex::new(interpreter)),
            cpu_handle,
            dispatcher,
            vfs,
            audio,
            input,
            gpu_parser,
            render_queue,
            hle_ctx,
            loader: ExecutableLoader::new(logger.clone()),
            state: Mutex::new(EmuState::Idle),
            state_callback: Mutex::new(None),
            thread_handle: Mutex::new(None),
            game_loaded: AtomicBool::new(false),
        };
        logger.info("emulator", "initialization complete");
        Ok(core)
    }

    /// Stops a running guest, tears down the subsystems, and drops the
    /// core. Consuming `self` gives the "shutdown" lifecycle operation a
    /// natural Rust shape: once this returns, nothing is left to leak.
    pub fn shutdown(self) {
        let _ = self.stop();
        self.logger.info("emulator", "shutdown complete");
    }

    pub fn set_state_callback(&self, cb: impl Fn(EmuState) + Send + 'static) {
        *self.state_callback.lock().unwrap() = Some(Box::new(cb));
    }

    pub fn set_log_callback(&self, cb: LogCallback) {
        self.logger.set_callback(cb);
    }

    pub fn state(&self) -> EmuState {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, new_state: EmuState) {
        *self.state.lock().unwrap() = new_state.clone();
        if let Some(cb) = self.state_callback.lock().unwrap().as_ref() {
            cb(new_state);
        }
    }

    pub fn vfs(&self) -> &VirtualFileSystem {
        &self.vfs
    }

    pub fn audio(&self) -> &AudioPortRegistry {
        &self.audio
    }

    pub fn input(&self) -> &InputRegistry {
        &self.input
    }

    pub fn render_queue(&self) -> &RenderCommandQueue {
        &self.render_queue
    }

    pub fn cpu_context_snapshot(&self) -> CpuContext {
        self.interpreter.lock().unwrap().context_snapshot()
    }

    /// Load order (spec §4.10): mount `/app0` and `/hostapp` onto the
    /// container's parent directory, hand the raw bytes to the Executable
    /// Loader, then seed RIP/RSP/RBP. Any failure -- including a guest
    /// execution panic surfacing through `catch_unwind` -- is reported as
    /// `EmuState::Error` rather than left for the caller to infer.
    pub fn load_game(&self, path: &Path) -> Result<u64, EmulatorError> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.load_game_inner(path)
        }));
        self.finish_load_attempt(outcome)
    }

    fn load_game_inner(&self, path: &Path) -> Result<u64, EmulatorError> {
        let raw = std::fs::read(path).map_err(|e| crate::error::LoaderError::Io(e.to_string()))?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if let Err(e) = self.vfs.mount("/app0", parent) {
            self.logger.warning("emulator", &format!("failed to mount /app0: {e}"));
        }
        if let Err(e) = self.vfs.mount("/hostapp", parent) {
            self.logger.warning("emulator", &format!("failed to mount /hostapp: {e}"));
        }

        let mut mem = self.memory.lock().unwrap();
        let loaded = self.loader.load(&raw, &mut mem)?;
        drop(mem);
        self.finish_load(loaded.entry_point);

        self.game_loaded.store(true, Ordering::Release);
        self.logger.info("emulator", &format!("game loaded, entry=0x{:x}", loaded.entry_point));
        Ok(loaded.entry_point)
    }

    /// Writes the internal diagnostic program at `USER_BASE` and points
    /// the interpreter at it, without going through the package/ELF
    /// pipeline (spec §4.10 "Internal BIOS").
    pub fn load_internal_bios(&self) -> Result<u64, EmulatorError> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let (bytes, entry) = internal_bios::build();
            let mut mem = self.memory.lock().unwrap();
            mem.write_block(entry, &bytes)?;
            drop(mem);
            self.finish_load(entry);
            self.game_loaded.store(true, Ordering::Release);
            self.logger.info("emulator", "internal BIOS loaded");
            Ok(entry)
        }));
        self.finish_load_attempt(outcome)
    }

    fn finish_load_attempt(
        &self,
        outcome: std::thread::Result<Result<u64, EmulatorError>>,
    ) -> Result<u64, EmulatorError> {
        match outcome {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(e)) => {
                self.set_state(EmuState::Error(e.to_string()));
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(&payload);
                self.set_state(EmuState::Error(message.clone()));
                Err(EmulatorError::GuestPanic(message))
            }
        }
    }

    fn finish_load(&self, entry_point: u64) {
        // Half the arena, not its full size: the top half is stack, the
        // bottom half (starting at USER_BASE) is code/data, so the two
        // never collide regardless of whether the arena is running at its
        // full 8 GiB or the degraded 512 MiB fallback (spec §4.1/§4.10).
        let arena_size = self.memory.lock().unwrap().size() as u64;
        let rsp = USER_BASE + (arena_size / 2) - STACK_TOP_OFFSET;

        let mut interp = self.interpreter.lock().unwrap();
        interp.reset();
        interp.context.rip = entry_point;
        interp.context.set_reg(RSP, rsp);
        interp.context.set_reg(RBP, rsp);
    }

    /// Spawns the guest CPU thread, unless the core refuses: no game
    /// loaded, or not currently `Idle`/`Paused` (spec §4.10). Resuming
    /// from `Paused` does not spawn a new thread -- the previous one is
    /// still alive, idling in `CpuInterpreter::run_loop`'s pause branch.
    pub fn run(&self) -> Result<(), EmulatorError> {
        if !self.game_loaded.load(Ordering::Acquire) {
            return Err(EmulatorError::NoGameLoaded);
        }
        match self.state() {
            EmuState::Idle => {}
            EmuState::Paused => {
                self.cpu_handle.resume();
                self.set_state(EmuState::Running);
                return Ok(());
            }
            other => return Err(EmulatorError::InvalidState(other)),
        }

        self.set_state(EmuState::Running);

        let memory = Arc::clone(&self.memory);
        let interpreter = Arc::clone(&self.interpreter);
        let dispatcher = Arc::clone(&self.dispatcher);
        let exit_requested = Arc::clone(&self.hle_ctx.exit_requested);
        let logger = self.logger.clone();

        let spawned = std::thread::Builder::new().name("wear-emu-cpu".into()).spawn(move || {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut invoker = DispatcherInvoker(dispatcher);
                let mut mem_guard = memory.lock().unwrap();
                let mut interp_guard = interpreter.lock().unwrap();
                interp_guard.run_loop(&mut mem_guard, &mut invoker);
            }));

            if let Err(payload) = outcome {
                logger.error("emulator", &format!("guest execution panic: {}", panic_message(&payload)));
            }
            if exit_requested.swap(false, Ordering::AcqRel) {
                logger.info("emulator", "guest requested process exit via sys_exit");
            }
        });

        match spawned {
            Ok(handle) => {
                *self.thread_handle.lock().unwrap() = Some(handle);
                Ok(())
            }
            Err(e) => {
                let message = format!("failed to spawn CPU thread: {e}");
                self.set_state(EmuState::Error(message.clone()));
                Err(EmulatorError::GuestPanic(message))
            }
        }
    }

    /// Refuses unless currently `Running` (spec §4.10).
    pub fn pause(&self) -> Result<(), EmulatorError> {
        let current = self.state();
        if current != EmuState::Running {
            return Err(EmulatorError::InvalidState(current));
        }
        self.cpu_handle.pause();
        self.set_state(EmuState::Paused);
        Ok(())
    }

    /// Refuses from `Idle` (nothing to stop). Joins the CPU thread, resets
    /// the interpreter and input state, and clears the loaded-game flag.
    pub fn stop(&self) -> Result<(), EmulatorError> {
        let current = self.state();
        if current == EmuState::Idle {
            return Err(EmulatorError::InvalidState(current));
        }
        self.set_state(EmuState::Stopping);
        self.cpu_handle.stop();
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.interpreter.lock().unwrap().reset();
        self.input.reset();
        self.game_loaded.store(false, Ordering::Release);
        self.set_state(EmuState::Idle);
        Ok(())
    }

    pub fn toggle_pause(&self) -> Result<(), EmulatorError> {
        match self.state() {
            EmuState::Running => self.pause(),
            EmuState::Paused => self.run(),
            other => Err(EmulatorError::InvalidState(other)),
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown guest panic".to_string()
    }
}

/// The synthesized "internal BIOS" program: prints a banner line, touches
/// `sceAudioOutInit`, then loops `scePadReadState` forever. It exists so a
/// caller can exercise the full Emulator Core without any real game
/// package, and is a fixture, not a stable contract (spec §9 Design
/// Notes) -- its byte layout is free to change as the interpreter's
/// opcode coverage grows. The opcodes used here (`REX.W MOV reg, imm64`,
/// `SYSCALL`, `NOP`, `JMP rel32`) are exactly the ones `cpu::mod` decodes,
/// rather than the `MOV r/m64, imm32` form (`0F C7`) that the original
/// byte-for-byte sequence used, since this interpreter never grew that
/// opcode.
mod internal_bios {
    use crate::cpu::decode::{RAX, RDI, RDX, RSI};
    use crate::memory::USER_BASE;
    use crate::syscall::nr;

    pub const LOG_LINE: &str = "WeaR-emu Internal BIOS v1.0";

    fn mov_imm64(reg_index: usize, imm: u64) -> Vec<u8> {
        let mut v = vec![0x48, 0xB8 + reg_index as u8];
        v.extend_from_slice(&imm.to_le_bytes());
        v
    }

    fn syscall() -> Vec<u8> {
        vec![0x0F, 0x05]
    }

    fn nop() -> Vec<u8> {
        vec![0x90]
    }

    fn jmp_rel32(rel: i32) -> Vec<u8> {
        let mut v = vec![0xE9];
        v.extend_from_slice(&rel.to_le_bytes());
        v
    }

    /// Builds the BIOS byte image and returns `(bytes, entry_point)`.
    /// `entry_point` is always `USER_BASE`: the image is written starting
    /// there.
    pub fn build() -> (Vec<u8>, u64) {
        let message = format!("{LOG_LINE}\n");
        let message_bytes = message.into_bytes();

        let mut code = Vec::new();

        // sys_write(1, &message, message.len())
        code.extend(mov_imm64(RAX, nr::WRITE));
        code.extend(mov_imm64(RDI, 1));
        let rsi_patch = code.len() + 2;
        code.extend(mov_imm64(RSI, 0)); // patched below
        code.extend(mov_imm64(RDX, message_bytes.len() as u64));
        code.extend(syscall());

        // sceAudioOutInit()
        code.extend(mov_imm64(RAX, nr::SCE_AUDIO_OUT_INIT));
        code.extend(syscall());

        // loop { scePadReadState(0, &pad_buf); nop }
        let loop_start = code.len();
        code.extend(mov_imm64(RAX, nr::SCE_PAD_READ_STATE));
        code.extend(mov_imm64(RDI, 0));
        let pad_rsi_patch = code.len() + 2;
        code.extend(mov_imm64(RSI, 0)); // patched below
        code.extend(syscall());
        code.extend(nop());
        let jmp_end = code.len() + 5;
        let rel = loop_start as i64 - jmp_end as i64;
        code.extend(jmp_rel32(rel as i32));

        let message_offset = code.len();
        code.extend_from_slice(&message_bytes);
        let pad_buffer_offset = code.len();
        code.resize(pad_buffer_offset + 0x68, 0);

        let message_addr = USER_BASE + message_offset as u64;
        let pad_addr = USER_BASE + pad_buffer_offset as u64;
        code[rsi_patch..rsi_patch + 8].copy_from_slice(&message_addr.to_le_bytes());
        code[pad_rsi_patch..pad_rsi_patch + 8].copy_from_slice(&pad_addr.to_le_bytes());

        (code, USER_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_specs() -> EmulatorSpecs {
        EmulatorSpecs { log_level: LogLevel::Debug, ..Default::default() }
    }

    #[test]
    fn initializes_into_idle_state() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        assert_eq!(core.state(), EmuState::Idle);
    }

    #[test]
    fn run_without_loaded_game_is_refused() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        assert!(matches!(core.run(), Err(EmulatorError::NoGameLoaded)));
        assert_eq!(core.state(), EmuState::Idle);
    }

    #[test]
    fn pause_and_stop_are_refused_when_idle() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        assert!(matches!(core.pause(), Err(EmulatorError::InvalidState(EmuState::Idle))));
        assert!(matches!(core.stop(), Err(EmulatorError::InvalidState(EmuState::Idle))));
    }

    #[test]
    fn internal_bios_boots_and_logs_banner_line() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        let entry = core.load_internal_bios().unwrap();
        assert_eq!(entry, USER_BASE);

        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        core.set_log_callback(Arc::new(move |_level, _component, message| {
            if message.contains(internal_bios::LOG_LINE) {
                seen2.store(true, Ordering::SeqCst);
            }
        }));

        core.run().unwrap();
        assert_eq!(core.state(), EmuState::Running);

        // The BIOS loops forever on scePadReadState, so give the thread a
        // short window to print its banner before tearing it down.
        std::thread::sleep(Duration::from_millis(50));
        assert!(seen.load(Ordering::SeqCst));

        core.stop().unwrap();
        assert_eq!(core.state(), EmuState::Idle);
    }

    #[test]
    fn pause_resume_round_trip_on_running_guest() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        core.load_internal_bios().unwrap();
        core.run().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        core.pause().unwrap();
        assert_eq!(core.state(), EmuState::Paused);

        core.run().unwrap();
        assert_eq!(core.state(), EmuState::Running);

        core.stop().unwrap();
    }

    #[test]
    fn toggle_pause_flips_between_running_and_paused() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        core.load_internal_bios().unwrap();
        core.run().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        core.toggle_pause().unwrap();
        assert_eq!(core.state(), EmuState::Paused);
        core.toggle_pause().unwrap();
        assert_eq!(core.state(), EmuState::Running);

        core.stop().unwrap();
    }

    #[test]
    fn stop_clears_game_loaded_flag_so_run_is_refused_again() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        core.load_internal_bios().unwrap();
        core.run().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        core.stop().unwrap();
        assert!(matches!(core.run(), Err(EmulatorError::NoGameLoaded)));
    }

    #[test]
    fn loading_missing_game_reports_error_state() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        let missing = tempdir().unwrap().path().join("does-not-exist.elf");
        let result = core.load_game(&missing);
        assert!(result.is_err());
        assert!(matches!(core.state(), EmuState::Error(_)));
    }

    #[test]
    fn state_callback_observes_transitions() {
        let core = EmulatorCore::initialize(test_specs()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        core.set_state_callback(move |_state| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        core.load_internal_bios().unwrap();
        core.run().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        core.stop().unwrap();
        assert!(count.load(Ordering::SeqCst) >= 2); // at least Running, then Idle
    }
}
