//! Mach-O MH_EXECUTE image assembly.
//!
//! The load commands are hand-encoded little-endian with fixed layouts, so
//! image construction is a pure function of the code bytes and compiles on
//! every host. The produced file is a PIE arm64 executable: `__PAGEZERO`
//! covering the first 4 GiB, `__TEXT` mapping the header + code + string
//! pool, `__LINKEDIT` holding the ad-hoc code signature, linked against
//! libSystem through dyld.

use super::sign;
use super::EmitError;

/// 16 KiB pages on arm64 macOS.
pub(super) const PAGE_SIZE: u64 = 0x4000;
const PAGE_ZERO_SIZE: u64 = 0x1_0000_0000;
const TEXT_VM_ADDR: u64 = 0x1_0000_0000;

const MH_MAGIC_64: u32 = 0xFEED_FACF;
const CPU_TYPE_ARM64: u32 = 0x0100_000C;
const CPU_SUBTYPE_ARM64_ALL: u32 = 0;
const MH_EXECUTE: u32 = 0x2;
// MH_NOUNDEFS | MH_DYLDLINK | MH_TWOLEVEL | MH_PIE
const HEADER_FLAGS: u32 = 0x1 | 0x4 | 0x80 | 0x0020_0000;

const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x2;
const LC_DYSYMTAB: u32 = 0xB;
const LC_LOAD_DYLIB: u32 = 0xC;
const LC_LOAD_DYLINKER: u32 = 0xE;
const LC_CODE_SIGNATURE: u32 = 0x1D;
const LC_FUNCTION_STARTS: u32 = 0x26;
const LC_DATA_IN_CODE: u32 = 0x29;
const LC_DYLD_INFO_ONLY: u32 = 0x8000_0022;
const LC_MAIN: u32 = 0x8000_0028;

const VM_PROT_READ: u32 = 0x1;
const VM_PROT_EXECUTE: u32 = 0x4;
const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

const MACH_HEADER_SIZE: u32 = 32;
const SEGMENT_COMMAND_SIZE: u32 = 72;
const SECTION_SIZE: u32 = 80;
const DYLINKER_COMMAND_SIZE: u32 = 12;
const DYLIB_COMMAND_SIZE: u32 = 24;
const DYLD_INFO_COMMAND_SIZE: u32 = 48;
const SYMTAB_COMMAND_SIZE: u32 = 24;
const DYSYMTAB_COMMAND_SIZE: u32 = 80;
const LINKEDIT_DATA_COMMAND_SIZE: u32 = 16;
const ENTRY_POINT_COMMAND_SIZE: u32 = 24;

const DYLD_PATH: &str = "/usr/lib/dyld";
const LIB_SYSTEM_PATH: &str = "/usr/lib/libSystem.B.dylib";

pub(super) fn align_to(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    let mask = alignment - 1;
    (value + mask) & !mask
}

fn dylinker_cmd_size() -> u32 {
    align_to(
        u64::from(DYLINKER_COMMAND_SIZE) + DYLD_PATH.len() as u64 + 1,
        8,
    ) as u32
}

fn dylib_cmd_size() -> u32 {
    align_to(
        u64::from(DYLIB_COMMAND_SIZE) + LIB_SYSTEM_PATH.len() as u64 + 1,
        8,
    ) as u32
}

fn sizeof_cmds() -> u32 {
    SEGMENT_COMMAND_SIZE
        + (SEGMENT_COMMAND_SIZE + SECTION_SIZE)
        + SEGMENT_COMMAND_SIZE
        + dylinker_cmd_size()
        + dylib_cmd_size()
        + DYLD_INFO_COMMAND_SIZE
        + SYMTAB_COMMAND_SIZE
        + DYSYMTAB_COMMAND_SIZE
        + LINKEDIT_DATA_COMMAND_SIZE
        + LINKEDIT_DATA_COMMAND_SIZE
        + ENTRY_POINT_COMMAND_SIZE
        + LINKEDIT_DATA_COMMAND_SIZE
}

/// File offset where the code lands, immediately after the load commands.
pub(super) fn code_offset() -> u32 {
    align_to(u64::from(MACH_HEADER_SIZE + sizeof_cmds()), 16) as u32
}

/// Cursor writing fixed-layout structures into a preallocated image.
struct Writer<'a> {
    image: &'a mut [u8],
    offset: usize,
}

impl<'a> Writer<'a> {
    fn u32(&mut self, value: u32) {
        self.image[self.offset..self.offset + 4].copy_from_slice(&value.to_le_bytes());
        self.offset += 4;
    }

    fn u64(&mut self, value: u64) {
        self.image[self.offset..self.offset + 8].copy_from_slice(&value.to_le_bytes());
        self.offset += 8;
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.image[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }

    /// 16-byte zero-padded segment/section name.
    fn name16(&mut self, name: &str) {
        let mut field = [0u8; 16];
        field[..name.len()].copy_from_slice(name.as_bytes());
        self.bytes(&field);
    }

    fn skip_to(&mut self, offset: usize) {
        self.offset = offset;
    }
}

/// Build the complete signed executable image around `code` (machine code
/// followed by the raw string-table bytes).
pub(super) fn build_image(code: &[u8]) -> Result<Vec<u8>, EmitError> {
    if code.is_empty() {
        return Err(EmitError::EmptyCode);
    }

    let code_offset = u64::from(code_offset());
    let code_size = code.len() as u64;
    let text_file_size = code_offset + code_size;
    let text_vm_size = align_to(text_file_size, PAGE_SIZE);

    let linkedit_file_off = align_to(text_file_size, PAGE_SIZE);
    let sig_offset = align_to(linkedit_file_off, 16);
    let code_limit = sig_offset as u32;

    let sig_size = sign::signature_size(code_limit);
    let linkedit_vm_addr = align_to(TEXT_VM_ADDR + text_vm_size, PAGE_SIZE);
    let linkedit_file_size = (sig_offset - linkedit_file_off) + u64::from(sig_size);
    let linkedit_vm_size = align_to(linkedit_file_size, PAGE_SIZE);
    let file_size = sig_offset + u64::from(sig_size);

    let mut image = vec![0u8; file_size as usize];
    let mut w = Writer {
        image: &mut image,
        offset: 0,
    };

    // mach_header_64
    w.u32(MH_MAGIC_64);
    w.u32(CPU_TYPE_ARM64);
    w.u32(CPU_SUBTYPE_ARM64_ALL);
    w.u32(MH_EXECUTE);
    w.u32(12); // ncmds
    w.u32(sizeof_cmds());
    w.u32(HEADER_FLAGS);
    w.u32(0); // reserved

    // __PAGEZERO
    w.u32(LC_SEGMENT_64);
    w.u32(SEGMENT_COMMAND_SIZE);
    w.name16("__PAGEZERO");
    w.u64(0); // vmaddr
    w.u64(PAGE_ZERO_SIZE);
    w.u64(0); // fileoff
    w.u64(0); // filesize
    w.u32(0); // maxprot
    w.u32(0); // initprot
    w.u32(0); // nsects
    w.u32(0); // flags

    // __TEXT with one __text section
    w.u32(LC_SEGMENT_64);
    w.u32(SEGMENT_COMMAND_SIZE + SECTION_SIZE);
    w.name16("__TEXT");
    w.u64(TEXT_VM_ADDR);
    w.u64(text_vm_size);
    w.u64(0);
    w.u64(text_file_size);
    w.u32(VM_PROT_READ | VM_PROT_EXECUTE);
    w.u32(VM_PROT_READ | VM_PROT_EXECUTE);
    w.u32(1);
    w.u32(0);
    w.name16("__text");
    w.name16("__TEXT");
    w.u64(TEXT_VM_ADDR + code_offset); // addr
    w.u64(code_size);
    w.u32(code_offset as u32);
    w.u32(2); // align 2^2
    w.u32(0); // reloff
    w.u32(0); // nreloc
    w.u32(S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS);
    w.u32(0);
    w.u32(0);
    w.u32(0);

    // __LINKEDIT
    w.u32(LC_SEGMENT_64);
    w.u32(SEGMENT_COMMAND_SIZE);
    w.name16("__LINKEDIT");
    w.u64(linkedit_vm_addr);
    w.u64(linkedit_vm_size);
    w.u64(linkedit_file_off);
    w.u64(linkedit_file_size);
    w.u32(VM_PROT_READ);
    w.u32(VM_PROT_READ);
    w.u32(0);
    w.u32(0);

    // LC_LOAD_DYLINKER
    let dylinker_start = w.offset;
    w.u32(LC_LOAD_DYLINKER);
    w.u32(dylinker_cmd_size());
    w.u32(DYLINKER_COMMAND_SIZE); // name offset
    w.bytes(DYLD_PATH.as_bytes());
    w.skip_to(dylinker_start + dylinker_cmd_size() as usize);

    // LC_LOAD_DYLIB (libSystem)
    let dylib_start = w.offset;
    w.u32(LC_LOAD_DYLIB);
    w.u32(dylib_cmd_size());
    w.u32(DYLIB_COMMAND_SIZE); // name offset
    w.u32(2); // timestamp
    w.u32(0x0001_0000); // current_version
    w.u32(0x0001_0000); // compatibility_version
    w.bytes(LIB_SYSTEM_PATH.as_bytes());
    w.skip_to(dylib_start + dylib_cmd_size() as usize);

    // LC_DYLD_INFO_ONLY (all tables empty)
    w.u32(LC_DYLD_INFO_ONLY);
    w.u32(DYLD_INFO_COMMAND_SIZE);
    w.skip_to(w.offset + (DYLD_INFO_COMMAND_SIZE - 8) as usize);

    // LC_SYMTAB (empty)
    w.u32(LC_SYMTAB);
    w.u32(SYMTAB_COMMAND_SIZE);
    w.skip_to(w.offset + (SYMTAB_COMMAND_SIZE - 8) as usize);

    // LC_DYSYMTAB (empty)
    w.u32(LC_DYSYMTAB);
    w.u32(DYSYMTAB_COMMAND_SIZE);
    w.skip_to(w.offset + (DYSYMTAB_COMMAND_SIZE - 8) as usize);

    // LC_FUNCTION_STARTS (empty)
    w.u32(LC_FUNCTION_STARTS);
    w.u32(LINKEDIT_DATA_COMMAND_SIZE);
    w.u32(0);
    w.u32(0);

    // LC_DATA_IN_CODE (empty)
    w.u32(LC_DATA_IN_CODE);
    w.u32(LINKEDIT_DATA_COMMAND_SIZE);
    w.u32(0);
    w.u32(0);

    // LC_MAIN
    w.u32(LC_MAIN);
    w.u32(ENTRY_POINT_COMMAND_SIZE);
    w.u64(code_offset); // entryoff
    w.u64(0); // stacksize

    // LC_CODE_SIGNATURE
    w.u32(LC_CODE_SIGNATURE);
    w.u32(LINKEDIT_DATA_COMMAND_SIZE);
    w.u32(sig_offset as u32);
    w.u32(sig_size);

    image[code_offset as usize..(code_offset + code_size) as usize].copy_from_slice(code);

    let signature = sign::build_code_signature(&image, code_limit)?;
    if signature.len() != sig_size as usize {
        return Err(EmitError::SignatureSizeMismatch);
    }
    image[sig_offset as usize..sig_offset as usize + signature.len()]
        .copy_from_slice(&signature);
    Ok(image)
}
