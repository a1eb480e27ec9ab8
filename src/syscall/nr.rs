//! Registered syscall numbers (spec §4.3) and the errno-style negative
//! constants handlers return in RAX on failure.

pub const EXIT: u64 = 1;
pub const READ: u64 = 3;
pub const WRITE: u64 = 4;
pub const OPEN: u64 = 5;
pub const CLOSE: u64 = 6;
pub const UNLINK: u64 = 10;
pub const GETPID: u64 = 20;
pub const GETUID: u64 = 24;
pub const IOCTL: u64 = 54;
pub const MUNMAP: u64 = 73;
pub const MPROTECT: u64 = 74;
pub const STAT: u64 = 188;
pub const FSTAT: u64 = 189;
pub const NANOSLEEP: u64 = 240;
pub const GETDENTS: u64 = 272;
pub const MMAP: u64 = 477;
pub const LSEEK: u64 = 478;

pub const SCE_KERNEL_LOAD_START_MODULE: u64 = 594;
pub const SCE_KERNEL_DEBUG_OUT: u64 = 602;
pub const SCE_KERNEL_IS_NEO_MODE: u64 = 618;
pub const SCE_KERNEL_GET_CPU_TEMPERATURE: u64 = 621;
pub const SCE_KERNEL_GET_MODULE_LIST: u64 = 611;
pub const SCE_KERNEL_GET_MODULE_INFO: u64 = 612;
pub const SCE_PAD_OPEN: u64 = 572;
pub const SCE_PAD_CLOSE: u64 = 573;
pub const SCE_PAD_READ: u64 = 570;
pub const SCE_PAD_READ_STATE: u64 = 571;
pub const SCE_PAD_SET_VIBRATION: u64 = 575;
pub const SCE_AUDIO_OUT_INIT: u64 = 495;
pub const SCE_AUDIO_OUT_OPEN: u64 = 496;
pub const SCE_AUDIO_OUT_CLOSE: u64 = 497;
pub const SCE_AUDIO_OUT_OUTPUT: u64 = 498;
pub const SCE_AUDIO_OUT_OUTPUTS: u64 = 499;
pub const SCE_AUDIO_OUT_SET_VOLUME: u64 = 500;
pub const SCE_AUDIO_OUT_GET_PORT_STATE: u64 = 501;
pub const SCE_AUDIO_OUT_GET_SYSTEM_STATE: u64 = 502;
pub const SCE_GNM_SUBMIT_COMMAND_BUFFERS: u64 = 591;
pub const SCE_GNM_SUBMIT_DONE: u64 = 614;
pub const SCE_GNM_GET_GPU_CORE_CLOCK_FREQUENCY: u64 = 626;

pub mod errno {
    pub const EPERM: i64 = 1;
    pub const ENOENT: i64 = 2;
    pub const EBADF: i64 = 9;
    pub const EFAULT: i64 = 14;
    pub const EINVAL: i64 = 22;
    pub const ENOSYS: i64 = 38;
}

/// Per-handler string length caps (spec §4.3).
pub const MAX_PATH_LEN: usize = 256;
pub const MAX_DEBUG_STRING_LEN: usize = 1024;
pub const MAX_WRITE_PAYLOAD_LEN: usize = 4096;
