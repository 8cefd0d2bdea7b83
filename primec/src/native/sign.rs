//! Ad-hoc Mach-O code signature.
//!
//! SuperBlob wrapping a single CodeDirectory whose code slots are SHA-256
//! hashes of each 16 KiB page of the image up to `code_limit` (the last
//! partial page zero-padded before hashing). The signature is a pure
//! function of the image bytes, so identical inputs produce identical
//! executables.

use sha2::{Digest, Sha256};

use super::EmitError;

const SUPER_BLOB_MAGIC: u32 = 0xFADE_0CC0;
const CODE_DIR_MAGIC: u32 = 0xFADE_0C02;
const CODE_DIR_VERSION: u32 = 0x2_0400;
/// CS_ADHOC
const CODE_DIR_FLAGS: u32 = 0x0000_0002;
const HASH_SIZE: u8 = 32;
/// SHA-256
const HASH_TYPE: u8 = 2;
const PLATFORM: u8 = 2;
/// 16 KiB pages on arm64 macOS.
const PAGE_SIZE_LOG2: u8 = 14;
const CODE_DIR_HEADER_SIZE: u32 = 88;
const IDENTIFIER: &str = "primec.native";

fn append_u32_be(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn append_u64_be(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn code_slot_count(code_limit: u32) -> u32 {
    (code_limit + (1 << PAGE_SIZE_LOG2) - 1) >> PAGE_SIZE_LOG2
}

fn code_directory_length(code_limit: u32) -> u32 {
    let ident_size = IDENTIFIER.len() as u32 + 1;
    CODE_DIR_HEADER_SIZE + ident_size + code_slot_count(code_limit) * u32::from(HASH_SIZE)
}

/// Total signature size for a given code limit; the Mach-O layout needs
/// this before the image bytes exist.
pub(super) fn signature_size(code_limit: u32) -> u32 {
    12 + 8 + code_directory_length(code_limit)
}

/// Build the SuperBlob + CodeDirectory signature over `image[..code_limit]`.
pub(super) fn build_code_signature(
    image: &[u8],
    code_limit: u32,
) -> Result<Vec<u8>, EmitError> {
    if code_limit == 0 || code_limit as usize > image.len() {
        return Err(EmitError::InvalidCodeLimit);
    }

    let ident_size = IDENTIFIER.len() as u32 + 1;
    let hash_offset = CODE_DIR_HEADER_SIZE + ident_size;
    let n_code_slots = code_slot_count(code_limit);
    let length = code_directory_length(code_limit);

    let mut code_dir = Vec::with_capacity(length as usize);
    append_u32_be(&mut code_dir, CODE_DIR_MAGIC);
    append_u32_be(&mut code_dir, length);
    append_u32_be(&mut code_dir, CODE_DIR_VERSION);
    append_u32_be(&mut code_dir, CODE_DIR_FLAGS);
    append_u32_be(&mut code_dir, hash_offset);
    append_u32_be(&mut code_dir, CODE_DIR_HEADER_SIZE); // identOffset
    append_u32_be(&mut code_dir, 0); // nSpecialSlots
    append_u32_be(&mut code_dir, n_code_slots);
    append_u32_be(&mut code_dir, code_limit);
    let hash_info = (u32::from(HASH_SIZE) << 24)
        | (u32::from(HASH_TYPE) << 16)
        | (u32::from(PLATFORM) << 8)
        | u32::from(PAGE_SIZE_LOG2);
    append_u32_be(&mut code_dir, hash_info);
    append_u32_be(&mut code_dir, 0); // spare2
    append_u32_be(&mut code_dir, 0); // scatterOffset
    append_u32_be(&mut code_dir, 0); // teamOffset
    append_u32_be(&mut code_dir, 0); // spare3
    append_u64_be(&mut code_dir, 0); // codeLimit64
    append_u64_be(&mut code_dir, 0); // execSegBase
    append_u64_be(&mut code_dir, 0); // execSegLimit
    append_u64_be(&mut code_dir, 0x4000_0000_0000); // execSegFlags: main binary

    code_dir.extend_from_slice(IDENTIFIER.as_bytes());
    code_dir.push(0);

    let page_size = 1usize << PAGE_SIZE_LOG2;
    for slot in 0..n_code_slots {
        let start = slot as usize * page_size;
        let end = (start + page_size).min(code_limit as usize);
        let mut sha = Sha256::new();
        if start < end {
            sha.update(&image[start..end]);
        }
        if end < start + page_size {
            sha.update(vec![0u8; start + page_size - end]);
        }
        code_dir.extend_from_slice(&sha.finalize());
    }

    let count = 1u32;
    let super_size = 12 + count * 8 + code_dir.len() as u32;
    let mut out = Vec::with_capacity(super_size as usize);
    append_u32_be(&mut out, SUPER_BLOB_MAGIC);
    append_u32_be(&mut out, super_size);
    append_u32_be(&mut out, count);
    append_u32_be(&mut out, 0); // slot type: CodeDirectory
    append_u32_be(&mut out, 12 + count * 8); // slot offset
    out.extend_from_slice(&code_dir);
    Ok(out)
}
