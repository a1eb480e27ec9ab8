//! sceKernelLoadStartModule and module introspection HLE handlers.

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub id: u32,
    pub name: String,
}

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_KERNEL_LOAD_START_MODULE,
            "sceKernelLoadStartModule",
            Box::new(move |_c, mem, args| {
                let path_ptr = args.as_u64(0);
                if path_ptr == 0 {
                    return SyscallResult::err(errno::EINVAL, "null path pointer");
                }
                let path = match mem.read_cstring(path_ptr, nr::MAX_PATH_LEN) {
                    Ok(p) => p,
                    Err(_) => return SyscallResult::err(errno::EFAULT, "path read fault"),
                };
                let mut modules = ctx.modules.lock().unwrap();
                let id = modules.len() as u32 + 1;
                modules.push(ModuleInfo { id, name: path.clone() });
                ctx.logger.info("module", &format!("loaded module '{path}' as id {id}"));
                SyscallResult::ok(id as i64)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_KERNEL_GET_MODULE_LIST,
            "sceKernelGetModuleList",
            Box::new(move |_c, mem, args| {
                let out_ptr = args.as_u64(0);
                let max_entries = args.as_u64(1) as usize;
                let modules = ctx.modules.lock().unwrap();
                let count = modules.len().min(max_entries);
                for (i, m) in modules.iter().take(count).enumerate() {
                    if mem.write::<u32>(out_ptr + (i as u64) * 4, m.id).is_err() {
                        return SyscallResult::err(errno::EFAULT, "module list write fault");
                    }
                }
                SyscallResult::ok(count as i64)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_KERNEL_GET_MODULE_INFO,
            "sceKernelGetModuleInfo",
            Box::new(move |_c, _m, args| {
                let id = args.as_u32(0);
                let modules = ctx.modules.lock().unwrap();
                if modules.iter().any(|m| m.id == id) {
                    SyscallResult::ok(0)
                } else {
                    SyscallResult::err(errno::EINVAL, "unknown module id")
                }
            }),
        );
    }
}
