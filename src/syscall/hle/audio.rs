//! sceAudioOut* HLE handlers.

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_INIT,
            "sceAudioOutInit",
            Box::new(move |_c, _m, _a| {
                ctx.logger.info("audio", "sceAudioOutInit");
                SyscallResult::ok(0)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_OPEN,
            "sceAudioOutOpen",
            Box::new(move |_c, _m, args| {
                let port_type = args.as_u32(1);
                let sample_count = args.as_u32(4);
                let handle = ctx.audio.open(port_type, sample_count);
                SyscallResult::ok(handle as i64)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_CLOSE,
            "sceAudioOutClose",
            Box::new(move |_c, _m, args| match ctx.audio.close(args.as_u64(0) as u32) {
                Ok(()) => SyscallResult::ok(0),
                Err(e) => SyscallResult::err(errno::EINVAL, e.to_string()),
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_OUTPUT,
            "sceAudioOutOutput",
            Box::new(move |_c, mem, args| {
                let handle = args.as_u64(0) as u32;
                let buf_ptr = args.as_u64(1);
                if buf_ptr == 0 {
                    return SyscallResult::ok(0); // flush/silence request
                }
                // sample_count (arg 2) * 2 channels * 2 bytes per sample (spec §4.7)
                let len = args.as_u64(2) as usize * 2 * 2;
                let mut pcm = vec![0u8; len];
                if mem.read_block(buf_ptr, &mut pcm).is_err() {
                    return SyscallResult::err(errno::EFAULT, "pcm read fault");
                }
                match ctx.audio.output(handle, &pcm) {
                    Ok(()) => SyscallResult::ok(0),
                    Err(e) => SyscallResult::err(errno::EINVAL, e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_OUTPUTS,
            "sceAudioOutOutputs",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                SyscallResult::ok(0)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_SET_VOLUME,
            "sceAudioOutSetVolume",
            Box::new(move |_c, _m, args| {
                let handle = args.as_u64(0) as u32;
                let volume = (args.as_u32(2) as f32) / 32767.0;
                match ctx.audio.set_volume(handle, volume) {
                    Ok(()) => SyscallResult::ok(0),
                    Err(e) => SyscallResult::err(errno::EINVAL, e.to_string()),
                }
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_GET_PORT_STATE,
            "sceAudioOutGetPortState",
            Box::new(move |_c, _m, args| match ctx.audio.frames_output(args.as_u64(0) as u32) {
                Ok(_) => SyscallResult::ok(0),
                Err(e) => SyscallResult::err(errno::EINVAL, e.to_string()),
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_AUDIO_OUT_GET_SYSTEM_STATE,
            "sceAudioOutGetSystemState",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                SyscallResult::ok(0)
            }),
        );
    }
}
