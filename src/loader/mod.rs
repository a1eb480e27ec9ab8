//! C11 — Executable Loader: detects package vs. raw ELF64 input, extracts
//! the payload, and maps it into Guest Memory.

pub mod elf;
pub mod package;

use crate::error::LoaderError;
use crate::logger::Logger;
use crate::memory::GuestMemory;
pub use elf::{LoadedElf, LoadedSegment};

pub struct ExecutableLoader {
    logger: Logger,
}

impl ExecutableLoader {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Loads `raw` (the bytes of a container file) into `mem`, transparently
    /// unwrapping a package container if present, and returns the resulting
    /// entry point plus segment map.
    pub fn load(&self, raw: &[u8], mem: &mut GuestMemory) -> Result<LoadedElf, LoaderError> {
        if raw.len() >= 4 && raw[0..4] == package::PACKAGE_MAGIC {
            self.logger.info("loader", "package container detected, extracting main executable");
            let elf_bytes = package::extract_main_executable(raw)?;
            return self.load_elf(&elf_bytes, mem);
        }
        self.load_elf(raw, mem)
    }

    fn load_elf(&self, data: &[u8], mem: &mut GuestMemory) -> Result<LoadedElf, LoaderError> {
        let loaded = elf::load_from_bytes(data, mem)?;
        for segment in &loaded.segments {
            self.logger.debug(
                "loader",
                &format!(
                    "segment {} vaddr=0x{:x} memsz=0x{:x} filesz=0x{:x}",
                    segment.type_name, segment.virtual_address, segment.memory_size, segment.file_size
                ),
            );
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::USER_BASE;

    #[test]
    fn raw_elf_without_package_wrapper_loads_directly() {
        let logger = Logger::default();
        let mut mem = GuestMemory::new(&logger).unwrap();
        let loader = ExecutableLoader::new(logger);

        let mut data = vec![0u8; 0x2000];
        data[0..4].copy_from_slice(&[0x7F, 0x45, 0x4C, 0x46]);
        data[4] = 2; // ELFCLASS64
        data[5] = 1; // ELFDATA2LSB
        data[16..18].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        data[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        data[24..32].copy_from_slice(&USER_BASE.to_le_bytes());
        data[32..40].copy_from_slice(&64u64.to_le_bytes());
        data[54..56].copy_from_slice(&56u16.to_le_bytes());
        data[56..58].copy_from_slice(&1u16.to_le_bytes());
        data[64..68].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        data[72..80].copy_from_slice(&0x1000u64.to_le_bytes());
        data[80..88].copy_from_slice(&USER_BASE.to_le_bytes());
        data[96..104].copy_from_slice(&0x100u64.to_le_bytes());
        data[104..112].copy_from_slice(&0x100u64.to_le_bytes());

        let result = loader.load(&data, &mut mem).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.entry_point, USER_BASE);
    }
}
