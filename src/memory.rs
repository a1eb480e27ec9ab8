//! C1 — Guest Memory: a single contiguous 8 GiB arena with a translation
//! layer and typed, bounds-checked accessors.

use crate::error::MemoryError;
use crate::logger::Logger;
use memmap2::MmapMut;

pub const ARENA_SIZE: usize = 8 * 1024 * 1024 * 1024;
pub const FALLBACK_ARENA_SIZE: usize = 512 * 1024 * 1024;
pub const USER_BASE: u64 = 0x0000_0000_0040_0000;

/// A type that can be read or written as a raw byte pattern in guest memory.
///
/// # Safety
/// Implementors must be valid for any bit pattern of their size (no padding
/// bytes, no niches) since `read`/`write` reinterpret raw arena bytes.
pub unsafe trait GuestPod: Copy {
    fn to_le_array(self) -> Vec<u8>;
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_guest_pod_int {
    ($ty:ty) => {
        unsafe impl GuestPod for $ty {
            fn to_le_array(self) -> Vec<u8> {
                self.to_le_bytes().to_vec()
            }
            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_guest_pod_int!(u8);
impl_guest_pod_int!(i8);
impl_guest_pod_int!(u16);
impl_guest_pod_int!(i16);
impl_guest_pod_int!(u32);
impl_guest_pod_int!(i32);
impl_guest_pod_int!(u64);
impl_guest_pod_int!(i64);
impl_guest_pod_int!(f32);
impl_guest_pod_int!(f64);

pub struct GuestMemory {
    arena: MmapMut,
    size: usize,
    degraded: bool,
}

impl GuestMemory {
    /// Attempts the full 8 GiB mapping; on failure falls back to a 512 MiB
    /// arena and logs a degraded-capacity warning (spec §4.1 Rationale).
    pub fn new(logger: &Logger) -> Result<Self, MemoryError> {
        match MmapMut::map_anon(ARENA_SIZE) {
            Ok(arena) => Ok(Self { arena, size: ARENA_SIZE, degraded: false }),
            Err(primary_err) => {
                logger.warning(
                    "memory",
                    &format!(
                        "failed to reserve {} byte arena ({}); falling back to {} bytes",
                        ARENA_SIZE, primary_err, FALLBACK_ARENA_SIZE
                    ),
                );
                match MmapMut::map_anon(FALLBACK_ARENA_SIZE) {
                    Ok(arena) => Ok(Self { arena, size: FALLBACK_ARENA_SIZE, degraded: true }),
                    Err(fallback_err) => {
                        Err(MemoryError::AllocationFailed(fallback_err.to_string()))
                    }
                }
            }
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Translates a guest virtual address into an arena offset per spec §3:
    /// addresses at or above `USER_BASE` are rebased then masked; addresses
    /// below it are masked directly. Either way the result always wraps
    /// within the arena rather than faulting at translation time — bounds
    /// are enforced at the access width instead.
    fn translate(&self, vaddr: u64) -> usize {
        let mask = (self.size as u64) - 1;
        let relative = if vaddr >= USER_BASE { vaddr - USER_BASE } else { vaddr };
        (relative & mask) as usize
    }

    pub fn is_valid(&self, vaddr: u64, size: usize) -> bool {
        if size == 0 {
            return true;
        }
        let offset = self.translate(vaddr);
        offset.checked_add(size).map(|end| end <= self.size).unwrap_or(false)
    }

    fn bounds_check(&self, vaddr: u64, len: usize) -> Result<usize, MemoryError> {
        let offset = self.translate(vaddr);
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(offset),
            _ => Err(MemoryError::OutOfBounds { addr: vaddr, len, arena_size: self.size }),
        }
    }

    pub fn read<T: GuestPod>(&self, vaddr: u64) -> Result<T, MemoryError> {
        let len = std::mem::size_of::<T>();
        let offset = self.bounds_check(vaddr, len)?;
        Ok(T::from_le_slice(&self.arena[offset..offset + len]))
    }

    pub fn write<T: GuestPod>(&mut self, vaddr: u64, value: T) -> Result<(), MemoryError> {
        let len = std::mem::size_of::<T>();
        let offset = self.bounds_check(vaddr, len)?;
        let bytes = value.to_le_array();
        self.arena[offset..offset + len].copy_from_slice(&bytes);
        Ok(())
    }

    pub fn read_block(&self, vaddr: u64, dst: &mut [u8]) -> Result<(), MemoryError> {
        if dst.is_empty() {
            return Ok(());
        }
        let offset = self.bounds_check(vaddr, dst.len())?;
        dst.copy_from_slice(&self.arena[offset..offset + dst.len()]);
        Ok(())
    }

    pub fn write_block(&mut self, vaddr: u64, src: &[u8]) -> Result<(), MemoryError> {
        if src.is_empty() {
            return Ok(());
        }
        let offset = self.bounds_check(vaddr, src.len())?;
        self.arena[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn fill(&mut self, vaddr: u64, byte: u8, len: usize) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let offset = self.bounds_check(vaddr, len)?;
        self.arena[offset..offset + len].fill(byte);
        Ok(())
    }

    pub fn zero(&mut self, vaddr: u64, len: usize) -> Result<(), MemoryError> {
        self.fill(vaddr, 0, len)
    }

    /// Reads a NUL-terminated string, stopping at `max_len` bytes even
    /// without a terminator (per-handler string caps, spec §4.3).
    pub fn read_cstring(&self, vaddr: u64, max_len: usize) -> Result<String, MemoryError> {
        let mut bytes = Vec::with_capacity(32.min(max_len));
        for i in 0..max_len {
            let b: u8 = self.read(vaddr + i as u64)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> Logger {
        Logger::default()
    }

    #[test]
    fn read_returns_most_recent_write() {
        let mut mem = GuestMemory::new(&test_logger()).unwrap();
        mem.write::<u32>(USER_BASE + 0x100, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read::<u32>(USER_BASE + 0x100).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn write_block_read_block_round_trip() {
        let mut mem = GuestMemory::new(&test_logger()).unwrap();
        let data: Vec<u8> = (0..=255u8).collect();
        mem.write_block(USER_BASE, &data).unwrap();
        let mut out = vec![0u8; data.len()];
        mem.read_block(USER_BASE, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn zero_length_is_noop_and_never_faults() {
        let mut mem = GuestMemory::new(&test_logger()).unwrap();
        mem.write_block(u64::MAX, &[]).unwrap();
        mem.read_block(u64::MAX, &mut []).unwrap();
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let mem = GuestMemory::new(&test_logger()).unwrap();
        let last_byte_vaddr = USER_BASE + (mem.size() as u64 - 1);
        assert!(mem.read::<u64>(last_byte_vaddr).is_err());
    }

    #[test]
    fn is_valid_respects_width() {
        let mem = GuestMemory::new(&test_logger()).unwrap();
        let last_byte_vaddr = USER_BASE + (mem.size() as u64 - 1);
        assert!(mem.is_valid(last_byte_vaddr, 1));
        assert!(!mem.is_valid(last_byte_vaddr, 2));
    }

    #[test]
    fn addresses_below_user_base_mask_directly() {
        let mut mem = GuestMemory::new(&test_logger()).unwrap();
        mem.write::<u8>(0x10, 0x42).unwrap();
        assert_eq!(mem.read::<u8>(0x10).unwrap(), 0x42);
    }
}
