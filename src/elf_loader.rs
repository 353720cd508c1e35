//! ELF-32 program loader.
//!
//! This is one of the collaborators the execution core only describes a
//! contract for: it hands the core a [`Memory`] whose loadable segments are
//! populated byte-for-byte from the file, zero-filled out to each
//! segment's memory size, plus the entry point that becomes the hart's
//! initial `pc`.

use elf::abi::PT_LOAD;
use elf::endian::AnyEndian;
use elf::ElfBytes;
use thiserror::Error;

use crate::memory::Memory;

#[derive(Error, Debug)]
pub enum ElfLoadError {
    #[error("failed to read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("malformed ELF: {0}")]
    Parse(#[from] elf::ParseError),
    #[error("segment at 0x{addr:x} does not fit the {size}-byte memory image")]
    SegmentOutOfBounds { addr: u32, size: usize },
}

/// Load an ELF32-LE RISC-V image into `memory`, returning the entry point.
pub fn load_elf(path: &str, memory: &mut Memory) -> Result<u32, ElfLoadError> {
    let bytes = std::fs::read(path).map_err(|e| ElfLoadError::Io(path.to_string(), e))?;
    load_elf_bytes(&bytes, memory)
}

/// As [`load_elf`], but from an in-memory ELF image (used by tests).
pub fn load_elf_bytes(bytes: &[u8], memory: &mut Memory) -> Result<u32, ElfLoadError> {
    let file = ElfBytes::<AnyEndian>::minimal_parse(bytes)?;

    let segments = file.segments().into_iter().flatten();
    for phdr in segments.filter(|p| p.p_type == PT_LOAD) {
        let addr = phdr.p_vaddr as u32;
        let file_size = phdr.p_filesz as usize;
        let mem_size = phdr.p_memsz as usize;

        let data = file
            .segment_data(&phdr)
            .map_err(ElfLoadError::Parse)?;
        let data = &data[..file_size.min(data.len())];

        memory
            .load_bytes(addr, data)
            .map_err(|_| ElfLoadError::SegmentOutOfBounds {
                addr,
                size: memory.size(),
            })?;

        if mem_size > file_size {
            let zeros = vec![0u8; mem_size - file_size];
            memory
                .load_bytes(addr + file_size as u32, &zeros)
                .map_err(|_| ElfLoadError::SegmentOutOfBounds {
                    addr,
                    size: memory.size(),
                })?;
        }

        log::info!(
            "loaded segment vaddr=0x{addr:08x} filesz={file_size} memsz={mem_size}"
        );
    }

    Ok(file.ehdr.e_entry as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal hand-built ELF32-LE image with a single PT_LOAD segment
    /// containing four bytes, backed by a larger memsz (to exercise
    /// zero-fill), entry point pointing at the segment's start.
    fn build_minimal_elf(vaddr: u32, payload: &[u8], memsz: u32, entry: u32) -> Vec<u8> {
        use elf::endian::AnyEndian;
        use elf::file::FileHeader;

        // Building a byte-correct ELF by hand without a writer crate:
        // delegate to the same struct layout `elf` itself reads, laid
        // out manually since this repo has no ELF *writer* dependency.
        let ehsize = 52u16;
        let phentsize = 32u16;
        let phoff = ehsize as u32;
        let mut buf = Vec::new();

        // e_ident
        buf.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        buf.push(1); // ELFCLASS32
        buf.push(1); // ELFDATA2LSB
        buf.push(1); // EV_CURRENT
        buf.extend_from_slice(&[0u8; 9]);

        buf.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
        buf.extend_from_slice(&0xf3u16.to_le_bytes()); // e_machine = EM_RISCV
        buf.extend_from_slice(&1u32.to_le_bytes()); // e_version
        buf.extend_from_slice(&entry.to_le_bytes()); // e_entry
        buf.extend_from_slice(&phoff.to_le_bytes()); // e_phoff
        buf.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        buf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        buf.extend_from_slice(&ehsize.to_le_bytes());
        buf.extend_from_slice(&phentsize.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        buf.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        buf.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        buf.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        assert_eq!(buf.len(), ehsize as usize);

        let data_off = ehsize as u32 + phentsize as u32;
        buf.extend_from_slice(&PT_LOAD.to_le_bytes()); // p_type
        buf.extend_from_slice(&data_off.to_le_bytes()); // p_offset
        buf.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
        buf.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes()); // p_filesz
        buf.extend_from_slice(&memsz.to_le_bytes()); // p_memsz
        buf.extend_from_slice(&7u32.to_le_bytes()); // p_flags (RWX)
        buf.extend_from_slice(&4u32.to_le_bytes()); // p_align

        buf.extend_from_slice(payload);

        // sanity check our hand layout parses the way we expect before
        // handing it to the real parser in the test body.
        let _: FileHeader<AnyEndian> =
            ElfBytes::<AnyEndian>::minimal_parse(&buf).unwrap().ehdr;

        buf
    }

    #[test]
    fn loads_segment_and_zero_fills_the_tail() {
        let payload = [0xde, 0xad, 0xbe, 0xef];
        let elf = build_minimal_elf(0x1000, &payload, 8, 0x1000);
        let mut mem = Memory::new(0x2000);
        let entry = load_elf_bytes(&elf, &mut mem).unwrap();
        assert_eq!(entry, 0x1000);
        assert_eq!(mem.read32(0x1000).unwrap(), 0xefbeadde);
        assert_eq!(mem.read32(0x1004).unwrap(), 0);
    }

    #[test]
    fn segment_outside_memory_is_an_error() {
        let payload = [1, 2, 3, 4];
        let elf = build_minimal_elf(0x1000, &payload, 4, 0x1000);
        let mut mem = Memory::new(16);
        assert!(load_elf_bytes(&elf, &mut mem).is_err());
    }
}
