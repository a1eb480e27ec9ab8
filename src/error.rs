//! Shared error taxonomy for the guest execution substrate.
//!
//! Every fallible subsystem gets its own variant-rich `thiserror::Error` enum
//! rather than a bare string, so the host UI log pane gets a real `Display`
//! and callers can match on the exact failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("out of bounds access: addr=0x{addr:x} len={len} arena_size=0x{arena_size:x}")]
    OutOfBounds { addr: u64, len: usize, arena_size: usize },
    #[error("failed to allocate guest memory arena: {0}")]
    AllocationFailed(String),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("invalid magic")]
    InvalidMagic,
    #[error("unsupported architecture")]
    UnsupportedArchitecture,
    #[error("segment exceeds memory bounds")]
    SegmentOutOfBounds,
    #[error("no loadable segments")]
    NoLoadableSegments,
    #[error("package extraction failed: {0}")]
    Package(#[from] PackageError),
    #[error("i/o error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("zero size")]
    ZeroSize,
    #[error("offset beyond file")]
    OffsetBeyondFile,
    #[error("size beyond file (sanitized)")]
    SizeBeyondFile,
    #[error("absurd size > 2 GiB (possible corruption)")]
    AbsurdSize,
    #[error("no valid entry found")]
    NoValidEntry,
    #[error("invalid magic")]
    InvalidMagic,
}

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("file already exists")]
    AlreadyExists,
    #[error("bad file descriptor")]
    BadFd,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("no space left on device")]
    NoSpace,
    #[error("out of memory")]
    OutOfMemory,
    #[error("i/o error: {0}")]
    Io(String),
}

impl VfsError {
    /// SCE-flavored positive-magnitude error codes (spec §4.6).
    pub fn sce_code(&self) -> i64 {
        match self {
            VfsError::NotFound => 0x8002_0002,
            VfsError::PermissionDenied => 0x8002_0013,
            VfsError::AlreadyExists => 0x8002_0011,
            VfsError::BadFd => 0x8002_0009,
            VfsError::InvalidArgument => 0x8002_0022,
            VfsError::NoSpace => 0x8002_0028,
            VfsError::OutOfMemory => 0x8002_0012,
            VfsError::Io(_) => 0x8002_0002,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyscallError {
    #[error("null path pointer")]
    NullPath,
    #[error("guest memory fault reading argument")]
    Fault,
    #[error("handler returned an error: {0}")]
    HandlerFailed(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("unknown port handle: {0}")]
    UnknownPort(u32),
    #[error("sink error: {0}")]
    Sink(String),
}

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("no game loaded")]
    NoGameLoaded,
    #[error("invalid state transition from {0:?}")]
    InvalidState(crate::emulator::EmuState),
    #[error("a guest execution panic was caught: {0}")]
    GuestPanic(String),
}
