//! The remaining BSD-style and console-extension handlers that don't
//! belong to fs/audio/input/module/debug/gnm: process lifecycle,
//! memory-protection no-ops, and a couple of console introspection
//! calls (spec §4.3's "at minimum" numeric table).

use super::HleContext;
use crate::syscall::nr;
use crate::syscall::{SyscallDispatcher, SyscallResult};
use std::sync::atomic::Ordering;

const NEO_MODE: i64 = 0; // Base-console mode; Neo/Pro is not emulated.
const CPU_TEMPERATURE_CELSIUS: i64 = 55;

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::EXIT,
            "exit",
            Box::new(move |_c, _m, args| {
                // sys_exit succeeds and asks the CPU thread to wind down
                // through the lock-free handle (spec §4.3 "Exit-class
                // syscalls" -- the dispatcher never halts the interpreter
                // directly, it can only ask).
                ctx.exit_requested.store(true, Ordering::Release);
                ctx.cpu_handle.stop();
                SyscallResult::ok(args.get(0))
            }),
        );
    }
    dispatcher.register(
        nr::GETPID,
        "getpid",
        Box::new(move |_c, _m, _a| SyscallResult::ok(1)),
    );
    dispatcher.register(
        nr::GETUID,
        "getuid",
        Box::new(move |_c, _m, _a| SyscallResult::ok(0)),
    );
    dispatcher.register(
        nr::IOCTL,
        "ioctl",
        Box::new(move |_c, _m, _a| SyscallResult::ok(0)),
    );
    dispatcher.register(
        nr::MUNMAP,
        "munmap",
        Box::new(move |_c, _m, _a| SyscallResult::ok(0)),
    );
    dispatcher.register(
        nr::MPROTECT,
        "mprotect",
        Box::new(move |_c, _m, _a| SyscallResult::ok(0)),
    );
    dispatcher.register(
        nr::MMAP,
        "mmap",
        // The arena already backs the guest's whole address space (spec
        // §4.1); mmap just echoes back the requested hint address so
        // guest code that anchors off the return value keeps working.
        Box::new(move |_c, _m, args| SyscallResult::ok(args.get(0))),
    );
    dispatcher.register(
        nr::NANOSLEEP,
        "nanosleep",
        Box::new(move |_c, mem, args| {
            let req_ptr = args.as_u64(0);
            if req_ptr != 0 {
                if let (Ok(secs), Ok(nanos)) =
                    (mem.read::<i64>(req_ptr), mem.read::<i64>(req_ptr + 8))
                {
                    let dur = std::time::Duration::new(secs.max(0) as u64, nanos.clamp(0, 999_999_999) as u32);
                    std::thread::sleep(dur.min(std::time::Duration::from_millis(200)));
                }
            }
            SyscallResult::ok(0)
        }),
    );
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_KERNEL_IS_NEO_MODE,
            "sceKernelIsNeoMode",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                SyscallResult::ok(NEO_MODE)
            }),
        );
    }
    dispatcher.register(
        nr::SCE_KERNEL_GET_CPU_TEMPERATURE,
        "sceKernelGetCpuTemperature",
        Box::new(move |_c, _m, _a| SyscallResult::ok(CPU_TEMPERATURE_CELSIUS)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioPortRegistry;
    use crate::cpu::decode::RAX;
    use crate::gpu::{GpuCommandParser, RenderCommandQueue};
    use crate::input::{InputRegistry, KeyMap};
    use crate::logger::Logger;
    use crate::memory::GuestMemory;
    use crate::vfs::VirtualFileSystem;
    use std::sync::{Arc, Mutex};

    fn setup() -> (SyscallDispatcher, GuestMemory, HleContext) {
        let logger = Logger::default();
        let mem = GuestMemory::new(&logger).unwrap();
        let interp = crate::cpu::CpuInterpreter::new(logger.clone());
        let ctx = HleContext::new(
            Arc::new(VirtualFileSystem::new()),
            Arc::new(AudioPortRegistry::new()),
            Arc::new(InputRegistry::new(KeyMap::Default)),
            Arc::new(Mutex::new(GpuCommandParser::new(logger.clone()))),
            Arc::new(RenderCommandQueue::new()),
            logger.clone(),
            interp.handle(),
        );
        let dispatcher = SyscallDispatcher::new(logger);
        register(&dispatcher, &ctx);
        (dispatcher, mem, ctx)
    }

    #[test]
    fn exit_sets_exit_requested_flag() {
        let (dispatcher, mut mem, ctx) = setup();
        let mut cpu_ctx = crate::cpu::CpuContext::default();
        cpu_ctx.set_reg(RAX, nr::EXIT);
        dispatcher.dispatch(&mut cpu_ctx, &mut mem);
        assert!(ctx.exit_requested.load(Ordering::Acquire));
    }

    #[test]
    fn getpid_returns_one() {
        let (dispatcher, mut mem, _ctx) = setup();
        let mut cpu_ctx = crate::cpu::CpuContext::default();
        cpu_ctx.set_reg(RAX, nr::GETPID);
        let result = dispatcher.dispatch(&mut cpu_ctx, &mut mem);
        assert_eq!(result.value, 1);
    }
}
