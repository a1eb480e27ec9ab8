//! C11 — package-container parsing: extracts the main-executable entry
//! (or, failing that, the largest plausible entry) from the console's
//! big-endian package format (spec §4.9, §6).

use crate::error::PackageError;

pub const PACKAGE_MAGIC: [u8; 4] = [0x7F, 0x43, 0x4E, 0x54];
const MAIN_EXECUTABLE_ENTRY_ID: u32 = 0x1000;
const MAX_EFFECTIVE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

const HEADER_SIZE: usize = 0x100;
const ENTRY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy)]
struct PackageHeader {
    table_offset: u32,
    entry_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct PackageEntry {
    id: u32,
    #[allow(dead_code)]
    filename_offset: u32,
    #[allow(dead_code)]
    flags: u32,
    data_offset: u32,
    data_size: u32,
}

fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}

fn parse_header(data: &[u8]) -> Result<PackageHeader, PackageError> {
    if data.len() < 4 || data[0..4] != PACKAGE_MAGIC {
        return Err(PackageError::InvalidMagic);
    }
    if data.len() < HEADER_SIZE {
        return Err(PackageError::OffsetBeyondFile);
    }
    // magic(4) revision(4) type(2) flags(2) entry_count(4) @ offset 12,
    // two additional entry counts (2,2), table_offset(4) @ offset 20 (spec §6).
    let entry_count = be_u32(data, 12).ok_or(PackageError::OffsetBeyondFile)?;
    let table_offset = be_u32(data, 20).ok_or(PackageError::OffsetBeyondFile)?;
    Ok(PackageHeader { table_offset, entry_count })
}

fn parse_entry(data: &[u8], offset: usize) -> Option<PackageEntry> {
    Some(PackageEntry {
        id: be_u32(data, offset)?,
        filename_offset: be_u32(data, offset + 4)?,
        flags: be_u32(data, offset + 8)?,
        data_offset: be_u32(data, offset + 16)?,
        data_size: be_u32(data, offset + 20)?,
    })
}

fn read_entries(data: &[u8], header: &PackageHeader) -> Vec<PackageEntry> {
    let mut entries = Vec::new();
    for i in 0..header.entry_count as usize {
        let offset = header.table_offset as usize + i * ENTRY_SIZE;
        if offset + ENTRY_SIZE > data.len() {
            break;
        }
        if let Some(entry) = parse_entry(data, offset) {
            entries.push(entry);
        }
    }
    entries
}

/// Extracts the main executable (id 0x1000) if present and valid;
/// otherwise falls back to the entry with the largest effective size
/// clamped to the remaining file bytes (spec §4.9 step 5).
pub fn extract_main_executable(data: &[u8]) -> Result<Vec<u8>, PackageError> {
    let header = parse_header(data)?;
    let entries = read_entries(data, &header);
    let file_size = data.len() as u64;

    if let Some(entry) = entries.iter().find(|e| e.id == MAIN_EXECUTABLE_ENTRY_ID) {
        if let Some(bytes) = try_extract(data, entry, file_size) {
            return Ok(bytes);
        }
    }

    let mut best: Option<(&PackageEntry, u64)> = None;
    for entry in &entries {
        let offset = entry.data_offset as u64;
        if offset >= file_size {
            continue;
        }
        let effective = (entry.data_size as u64).min(file_size - offset);
        if effective == 0 {
            continue;
        }
        if effective > MAX_EFFECTIVE_SIZE {
            continue;
        }
        match best {
            Some((_, best_eff)) if best_eff >= effective => {}
            _ => best = Some((entry, effective)),
        }
    }

    match best {
        Some((entry, effective)) => {
            let start = entry.data_offset as usize;
            Ok(data[start..start + effective as usize].to_vec())
        }
        None => Err(PackageError::NoValidEntry),
    }
}

fn try_extract(data: &[u8], entry: &PackageEntry, file_size: u64) -> Option<Vec<u8>> {
    if entry.data_size == 0 {
        return None;
    }
    let offset = entry.data_offset as u64;
    if offset >= file_size {
        return None;
    }
    let end = offset.checked_add(entry.data_size as u64)?;
    if end > file_size {
        return None;
    }
    Some(data[offset as usize..end as usize].to_vec())
}
