//! sceGnm* graphics-submit HLE handlers: the bridge from SYSCALL into the
//! GPU Command Parser (C10).

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};

const GPU_CORE_CLOCK_HZ: i64 = 911_000_000;

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_GNM_SUBMIT_COMMAND_BUFFERS,
            "sceGnmSubmitCommandBuffers",
            Box::new(move |_c, mem, args| {
                let count = args.as_u64(0) as usize;
                let cmd_ptrs_addr = args.as_u64(1);
                let sizes_addr = args.as_u64(2);

                let mut parser = ctx.gpu_parser.lock().unwrap();
                for i in 0..count {
                    let buffer_address: u64 = match mem.read(cmd_ptrs_addr + (i as u64) * 8) {
                        Ok(v) => v,
                        Err(_) => return SyscallResult::err(errno::EFAULT, "cmd_ptrs read fault"),
                    };
                    let size_bytes: u32 = match mem.read(sizes_addr + (i as u64) * 4) {
                        Ok(v) => v,
                        Err(_) => return SyscallResult::err(errno::EFAULT, "sizes read fault"),
                    };
                    let word_count = (size_bytes / 4) as usize;
                    parser.parse_buffer(mem, &ctx.render_queue, buffer_address, word_count);
                }
                SyscallResult::ok(0)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_GNM_SUBMIT_DONE,
            "sceGnmSubmitDone",
            Box::new(move |_c, _m, _a| {
                ctx.render_queue.end_frame();
                SyscallResult::ok(0)
            }),
        );
    }
    {
        dispatcher.register(
            nr::SCE_GNM_GET_GPU_CORE_CLOCK_FREQUENCY,
            "sceGnmGetGpuCoreClockFrequency",
            Box::new(move |_c, _m, _a| SyscallResult::ok(GPU_CORE_CLOCK_HZ)),
        );
    }
}
