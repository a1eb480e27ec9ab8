//! C11 — ELF64 validation and PT_LOAD segment mapping, grounded directly
//! on the teacher's `kernel/src/elf.rs` header layout and program-header
//! walk, retargeted at the shared `GuestMemory` arena instead of
//! per-segment heap buffers.

use crate::error::LoaderError;
use crate::memory::GuestMemory;

const ELF_MAGIC: [u8; 4] = [0x7F, 0x45, 0x4C, 0x46];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EM_X86_64: u16 = 62;
const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const PT_LOAD: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Header {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(offset..offset + 2)?.try_into().ok()?))
}
fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}
fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(data.get(offset..offset + 8)?.try_into().ok()?))
}

impl Elf64Header {
    fn from_bytes(data: &[u8]) -> Result<Self, LoaderError> {
        if data.len() < 64 {
            return Err(LoaderError::InvalidMagic);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(LoaderError::InvalidMagic);
        }
        if data[4] != ELFCLASS64 {
            return Err(LoaderError::UnsupportedArchitecture);
        }
        if data[5] != ELFDATA2LSB {
            return Err(LoaderError::UnsupportedArchitecture);
        }

        let mut ident = [0u8; 16];
        ident.copy_from_slice(&data[0..16]);
        let header = Elf64Header {
            e_ident: ident,
            e_type: read_u16(data, 16).ok_or(LoaderError::InvalidMagic)?,
            e_machine: read_u16(data, 18).ok_or(LoaderError::InvalidMagic)?,
            e_version: read_u32(data, 20).ok_or(LoaderError::InvalidMagic)?,
            e_entry: read_u64(data, 24).ok_or(LoaderError::InvalidMagic)?,
            e_phoff: read_u64(data, 32).ok_or(LoaderError::InvalidMagic)?,
            e_shoff: read_u64(data, 40).ok_or(LoaderError::InvalidMagic)?,
            e_flags: read_u32(data, 48).ok_or(LoaderError::InvalidMagic)?,
            e_ehsize: read_u16(data, 52).ok_or(LoaderError::InvalidMagic)?,
            e_phentsize: read_u16(data, 54).ok_or(LoaderError::InvalidMagic)?,
            e_phnum: read_u16(data, 56).ok_or(LoaderError::InvalidMagic)?,
            e_shentsize: read_u16(data, 58).ok_or(LoaderError::InvalidMagic)?,
            e_shnum: read_u16(data, 60).ok_or(LoaderError::InvalidMagic)?,
            e_shstrndx: read_u16(data, 62).ok_or(LoaderError::InvalidMagic)?,
        };

        if header.e_machine != EM_X86_64 {
            return Err(LoaderError::UnsupportedArchitecture);
        }
        if header.e_type != ET_EXEC && header.e_type != ET_DYN {
            return Err(LoaderError::UnsupportedArchitecture);
        }
        Ok(header)
    }
}

fn read_phdr(data: &[u8], offset: usize) -> Option<Elf64Phdr> {
    Some(Elf64Phdr {
        p_type: read_u32(data, offset)?,
        p_flags: read_u32(data, offset + 4)?,
        p_offset: read_u64(data, offset + 8)?,
        p_vaddr: read_u64(data, offset + 16)?,
        p_paddr: read_u64(data, offset + 24)?,
        p_filesz: read_u64(data, offset + 32)?,
        p_memsz: read_u64(data, offset + 40)?,
        p_align: read_u64(data, offset + 48)?,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedSegment {
    pub virtual_address: u64,
    pub memory_size: u64,
    pub file_size: u64,
    pub permission_flags: u32,
    pub type_name: &'static str,
}

#[derive(Debug, Clone)]
pub struct LoadedElf {
    pub entry_point: u64,
    pub base_address: u64,
    pub top_address: u64,
    pub segments: Vec<LoadedSegment>,
    pub is_valid: bool,
}

fn ps_segment_name(p_type: u32) -> &'static str {
    match p_type {
        PT_LOAD => "LOAD",
        2 => "DYNAMIC",
        3 => "INTERP",
        4 => "NOTE",
        6 => "PHDR",
        7 => "TLS",
        t if (0x6100_0000..=0x6100_001F).contains(&t) => "PS-SPECIFIC",
        _ => "OTHER",
    }
}

/// Validates the ELF64 header and maps every PT_LOAD segment into `mem`,
/// copying file bytes and zero-filling the BSS tail (spec §4.9).
pub fn load_from_bytes(data: &[u8], mem: &mut GuestMemory) -> Result<LoadedElf, LoaderError> {
    let header = Elf64Header::from_bytes(data)?;

    let mut segments = Vec::new();
    let mut min_vaddr = u64::MAX;
    let mut max_end = 0u64;

    for i in 0..header.e_phnum as usize {
        let offset = header.e_phoff as usize + i * header.e_phentsize as usize;
        let phdr = read_phdr(data, offset).ok_or(LoaderError::InvalidMagic)?;

        if phdr.p_type != PT_LOAD {
            continue;
        }

        let file_end = phdr
            .p_offset
            .checked_add(phdr.p_filesz)
            .ok_or(LoaderError::SegmentOutOfBounds)?;
        if file_end > data.len() as u64 {
            return Err(LoaderError::SegmentOutOfBounds);
        }

        let vaddr_end = phdr
            .p_vaddr
            .checked_add(phdr.p_memsz)
            .ok_or(LoaderError::SegmentOutOfBounds)?;
        if !mem.is_valid(phdr.p_vaddr, phdr.p_memsz as usize) {
            return Err(LoaderError::SegmentOutOfBounds);
        }

        let file_start = phdr.p_offset as usize;
        let file_bytes = &data[file_start..file_start + phdr.p_filesz as usize];
        mem.write_block(phdr.p_vaddr, file_bytes).map_err(|_| LoaderError::SegmentOutOfBounds)?;

        if phdr.p_memsz > phdr.p_filesz {
            let bss_start = phdr.p_vaddr + phdr.p_filesz;
            let bss_len = (phdr.p_memsz - phdr.p_filesz) as usize;
            mem.zero(bss_start, bss_len).map_err(|_| LoaderError::SegmentOutOfBounds)?;
        }

        min_vaddr = min_vaddr.min(phdr.p_vaddr);
        max_end = max_end.max(vaddr_end);

        segments.push(LoadedSegment {
            virtual_address: phdr.p_vaddr,
            memory_size: phdr.p_memsz,
            file_size: phdr.p_filesz,
            permission_flags: phdr.p_flags,
            type_name: ps_segment_name(phdr.p_type),
        });
    }

    if segments.is_empty() {
        return Err(LoaderError::NoLoadableSegments);
    }

    Ok(LoadedElf {
        entry_point: header.e_entry,
        base_address: min_vaddr,
        top_address: max_end,
        is_valid: true,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::memory::USER_BASE;

    fn build_elf(load_vaddr: u64, file_size: usize, mem_size: usize, total_file_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; total_file_len];
        buf[0..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = ELFCLASS64;
        buf[5] = ELFDATA2LSB;
        buf[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        buf[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        buf[24..32].copy_from_slice(&load_vaddr.to_le_bytes()); // e_entry
        let phoff: u64 = 64;
        buf[32..40].copy_from_slice(&phoff.to_le_bytes());
        buf[54..56].copy_from_slice(&56u16.to_le_bytes()); // e_phentsize
        buf[56..58].copy_from_slice(&1u16.to_le_bytes()); // e_phnum

        let ph_offset = phoff as usize;
        buf[ph_offset..ph_offset + 4].copy_from_slice(&PT_LOAD.to_le_bytes());
        buf[ph_offset + 8..ph_offset + 16].copy_from_slice(&(0x1000u64).to_le_bytes()); // p_offset
        buf[ph_offset + 16..ph_offset + 24].copy_from_slice(&load_vaddr.to_le_bytes());
        buf[ph_offset + 32..ph_offset + 40].copy_from_slice(&(file_size as u64).to_le_bytes());
        buf[ph_offset + 40..ph_offset + 48].copy_from_slice(&(mem_size as u64).to_le_bytes());

        if buf.len() < 0x1000 + file_size {
            buf.resize(0x1000 + file_size, 0xAB);
        }
        buf
    }

    #[test]
    fn loads_segment_and_zeroes_bss() {
        let logger = Logger::default();
        let mut mem = GuestMemory::new(&logger).unwrap();
        let data = build_elf(USER_BASE, 0x1000, 0x1000, 0x2000);
        // mark the bytes at file offset 0x1000 so we can verify the copy
        let mut data = data;
        data[0x1000..0x1000 + 4].copy_from_slice(&[0x11, 0x22, 0x33, 0x44]);

        let loaded = load_from_bytes(&data, &mut mem).unwrap();
        assert!(loaded.is_valid);
        assert_eq!(mem.read::<u32>(USER_BASE).unwrap(), 0x4433_2211);
    }

    #[test]
    fn rejects_bad_magic() {
        let logger = Logger::default();
        let mut mem = GuestMemory::new(&logger).unwrap();
        let data = vec![0u8; 128];
        assert!(matches!(load_from_bytes(&data, &mut mem), Err(LoaderError::InvalidMagic)));
    }

    #[test]
    fn scenario_s6_segment_bounds_and_bss_zero() {
        let logger = Logger::default();
        let mut mem = GuestMemory::new(&logger).unwrap();
        // LOAD segment at USER_BASE, file_size = memory_size = 0x1000, file
        // offset 0x1000 within a 0x2000-byte file.
        let mut data = build_elf(USER_BASE, 0x1000, 0x1000, 0x2000);
        data[0x1000..0x1000 + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        load_from_bytes(&data, &mut mem).unwrap();
        assert_eq!(mem.read::<u32>(USER_BASE).unwrap(), 0xEFBE_ADDE);
        assert_eq!(mem.read::<u8>(USER_BASE + 0x1000).unwrap(), 0);
    }
}
