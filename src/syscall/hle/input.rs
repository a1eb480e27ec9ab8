//! scePad* HLE handlers: open/close/read/read-state/vibration.

use super::HleContext;
use crate::syscall::nr::{self, errno};
use crate::syscall::{SyscallDispatcher, SyscallResult};

/// Packed 104-byte layout per spec §6.
#[repr(C, packed)]
struct PadReadBuffer {
    buttons: u32,
    lx: u8,
    ly: u8,
    rx: u8,
    ry: u8,
    analog_l2: u8,
    analog_r2: u8,
    _pad0: u16,
    orientation: [f32; 4],
    accel: [f32; 3],
    gyro: [f32; 3],
    touch_data: [u8; 24],
    connected: u8,
    _pad1: [u8; 3],
    timestamp: u64,
    extension: [u8; 12],
    connected_count: u8,
    _pad2: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<PadReadBuffer>() == 0x68);

fn build_pad_buffer(ctx: &HleContext) -> PadReadBuffer {
    let snap = ctx.input.snapshot();
    PadReadBuffer {
        buttons: snap.button_bitmask,
        lx: snap.lx,
        ly: snap.ly,
        rx: snap.rx,
        ry: snap.ry,
        analog_l2: snap.l2,
        analog_r2: snap.r2,
        _pad0: 0,
        orientation: [0.0, 0.0, 0.0, 1.0],
        accel: [snap.motion[0], snap.motion[1], snap.motion[2]],
        gyro: [snap.motion[3], snap.motion[4], snap.motion[5]],
        touch_data: [0u8; 24],
        connected: snap.connected as u8,
        _pad1: [0; 3],
        timestamp: 0,
        extension: [0u8; 12],
        connected_count: if snap.connected { 1 } else { 0 },
        _pad2: [0; 3],
    }
}

fn pad_buffer_bytes(buf: &PadReadBuffer) -> [u8; 0x68] {
    // SAFETY: PadReadBuffer is repr(C, packed) with only integer/float
    // fields and explicit padding, matching the wire layout exactly.
    unsafe { std::mem::transmute_copy(buf) }
}

pub fn register(dispatcher: &SyscallDispatcher, ctx: &HleContext) {
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_PAD_OPEN,
            "scePadOpen",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                SyscallResult::ok(1) // single fixed pad handle
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_PAD_CLOSE,
            "scePadClose",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx;
                SyscallResult::ok(0)
            }),
        );
    }
    for (&number, name) in
        [(&nr::SCE_PAD_READ, "scePadRead"), (&nr::SCE_PAD_READ_STATE, "scePadReadState")].iter()
    {
        let ctx = ctx.clone();
        dispatcher.register(
            number,
            name,
            Box::new(move |_c, mem, args| {
                let out_ptr = args.as_u64(1);
                if out_ptr == 0 {
                    return SyscallResult::err(errno::EINVAL, "null buffer pointer");
                }
                let buf = build_pad_buffer(&ctx);
                let bytes = pad_buffer_bytes(&buf);
                if mem.write_block(out_ptr, &bytes).is_err() {
                    return SyscallResult::err(errno::EFAULT, "pad buffer write fault");
                }
                SyscallResult::ok(0)
            }),
        );
    }
    {
        let ctx = ctx.clone();
        dispatcher.register(
            nr::SCE_PAD_SET_VIBRATION,
            "scePadSetVibration",
            Box::new(move |_c, _m, _a| {
                let _ = &ctx; // vibration motors are a host collaborator, out of scope
                SyscallResult::ok(0)
            }),
        );
    }
}
