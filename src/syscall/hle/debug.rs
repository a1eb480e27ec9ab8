//! sceKernelDebugOut HLE handler.

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    let ctx = ctx.clone();
    dispatcher.register(
        nr::SCE_KERNEL_DEBUG_OUT,
        "sceKernelDebugOut",
        Box::new(move |_c, mem, args| {
            let str_ptr = args.as_u64(0);
            if str_ptr == 0 {
                return SyscallResult::err(errno::EINVAL, "null debug string pointer");
            }
            match mem.read_cstring(str_ptr, nr::MAX_DEBUG_STRING_LEN) {
                Ok(text) => {
                    ctx.logger.info("guest-debug", &text);
                    SyscallResult::ok(text.len() as i64)
                }
                Err(_) => SyscallResult::err(errno::EFAULT, "debug string read fault"),
            }
        }),
    );
}
