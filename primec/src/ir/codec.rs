//! Binary IR format for lowered modules.
//!
//! This module serializes and deserializes [`IrModule`] values to the
//! versioned PSIR format. The codec enforces only structural invariants
//! (magic, version, entry index, length prefixes); it has no knowledge of
//! opcode semantics beyond the closed opcode byte set.
//!
//! # File Format
//!
//! All integers are little-endian.
//!
//! ```text
//! +--------------------+
//! | Magic (4 bytes)    |  "PSIR" (0x50534952)
//! +--------------------+
//! | Version (4 bytes)  |  u32 format version
//! +--------------------+
//! | funcCount u32      |
//! | entryIndex u32     |
//! +--------------------+
//! | stringCount u32    |
//! | { len u32, bytes } |  x stringCount
//! +--------------------+
//! | { nameLen u32,     |
//! |   name bytes,      |
//! |   instCount u32,   |
//! |   { op u8,         |
//! |     imm u64 } x N  |  x funcCount
//! +--------------------+
//! ```
//!
//! Round-trip property: `deserialize(serialize(m)) == m` for every
//! well-formed module.

use std::path::Path;

use thiserror::Error;

use super::{IrFunction, IrInstruction, IrModule, IrOpcode};

/// Magic identifying a serialized IR module ("PSIR").
pub const MAGIC: u32 = 0x5053_4952;

/// Current IR format version.
pub const VERSION: u32 = 9;

/// IR codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid IR header")]
    InvalidHeader,
    #[error("unsupported IR version")]
    UnsupportedVersion,
    #[error("invalid IR entry index")]
    InvalidEntryIndex,
    #[error("too many strings for IR serialization")]
    TooManyStrings,
    #[error("string literal too long for IR serialization")]
    StringTooLong,
    #[error("function name too long for IR serialization")]
    NameTooLong,
    #[error("too many IR instructions")]
    TooManyInstructions,
    /// A length prefix pointed past the end of the input.
    #[error("truncated IR {0}")]
    Truncated(&'static str),
    /// An opcode byte outside the closed set. The in-memory model cannot
    /// represent unknown opcodes, so the decode surfaces the same message
    /// downstream execution would.
    #[error("unknown IR opcode")]
    UnknownOpcode,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn append_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn append_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.offset..self.offset + 4)?;
        self.offset += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let bytes = self.data.get(self.offset..self.offset + 8)?;
        self.offset += 8;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.offset)?;
        self.offset += 1;
        Some(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.offset..self.offset.checked_add(len)?)?;
        self.offset += len;
        Some(bytes)
    }
}

/// Serialize a module to PSIR bytes.
pub fn serialize(module: &IrModule) -> Result<Vec<u8>, CodecError> {
    if module.entry_index as usize >= module.functions.len() {
        return Err(CodecError::InvalidEntryIndex);
    }
    let mut out = Vec::new();
    append_u32(&mut out, MAGIC);
    append_u32(&mut out, VERSION);
    let func_count =
        u32::try_from(module.functions.len()).map_err(|_| CodecError::TooManyInstructions)?;
    append_u32(&mut out, func_count);
    append_u32(&mut out, module.entry_index);
    let string_count =
        u32::try_from(module.string_table.len()).map_err(|_| CodecError::TooManyStrings)?;
    append_u32(&mut out, string_count);
    for text in &module.string_table {
        let len = u32::try_from(text.len()).map_err(|_| CodecError::StringTooLong)?;
        append_u32(&mut out, len);
        out.extend_from_slice(text.as_bytes());
    }
    for function in &module.functions {
        let name_len = u32::try_from(function.name.len()).map_err(|_| CodecError::NameTooLong)?;
        append_u32(&mut out, name_len);
        out.extend_from_slice(function.name.as_bytes());
        let inst_count = u32::try_from(function.instructions.len())
            .map_err(|_| CodecError::TooManyInstructions)?;
        append_u32(&mut out, inst_count);
        for inst in &function.instructions {
            out.push(inst.op as u8);
            append_u64(&mut out, inst.imm);
        }
    }
    Ok(out)
}

/// Deserialize a module from PSIR bytes.
pub fn deserialize(data: &[u8]) -> Result<IrModule, CodecError> {
    let mut reader = Reader::new(data);
    let magic = reader.read_u32().ok_or(CodecError::InvalidHeader)?;
    if magic != MAGIC {
        return Err(CodecError::InvalidHeader);
    }
    let version = reader.read_u32().ok_or(CodecError::UnsupportedVersion)?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion);
    }
    let func_count = reader.read_u32().ok_or(CodecError::Truncated("header"))?;
    let entry_index = reader.read_u32().ok_or(CodecError::Truncated("header"))?;
    let string_count = reader
        .read_u32()
        .ok_or(CodecError::Truncated("string table"))?;

    let mut string_table = Vec::with_capacity(string_count.min(1024) as usize);
    for _ in 0..string_count {
        let len = reader
            .read_u32()
            .ok_or(CodecError::Truncated("string length"))?;
        let bytes = reader
            .read_bytes(len as usize)
            .ok_or(CodecError::Truncated("string"))?;
        string_table.push(String::from_utf8_lossy(bytes).into_owned());
    }

    let mut functions = Vec::with_capacity(func_count.min(1024) as usize);
    for _ in 0..func_count {
        let name_len = reader
            .read_u32()
            .ok_or(CodecError::Truncated("function header"))?;
        let name_bytes = reader
            .read_bytes(name_len as usize)
            .ok_or(CodecError::Truncated("function name"))?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();
        let inst_count = reader
            .read_u32()
            .ok_or(CodecError::Truncated("instruction count"))?;
        let mut instructions = Vec::with_capacity(inst_count.min(65536) as usize);
        for _ in 0..inst_count {
            let byte = reader.read_u8().ok_or(CodecError::Truncated("instruction"))?;
            let op = IrOpcode::from_u8(byte).ok_or(CodecError::UnknownOpcode)?;
            let imm = reader
                .read_u64()
                .ok_or(CodecError::Truncated("instruction data"))?;
            instructions.push(IrInstruction { op, imm });
        }
        functions.push(IrFunction { name, instructions });
    }

    if entry_index as usize >= functions.len() {
        return Err(CodecError::InvalidEntryIndex);
    }

    Ok(IrModule {
        functions,
        entry_index,
        string_table,
    })
}

/// Serialize a module and write it to `path`.
pub fn save<P: AsRef<Path>>(module: &IrModule, path: P) -> Result<(), CodecError> {
    let bytes = serialize(module)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read and deserialize a module from `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<IrModule, CodecError> {
    let bytes = std::fs::read(path)?;
    deserialize(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_module() -> IrModule {
        IrModule {
            functions: vec![IrFunction {
                name: "/main".to_string(),
                instructions: vec![
                    IrInstruction::new(IrOpcode::PushI32, 1),
                    IrInstruction::new(IrOpcode::PushI32, 2),
                    IrInstruction::new(IrOpcode::AddI32, 0),
                    IrInstruction::new(IrOpcode::ReturnI32, 0),
                ],
            }],
            entry_index: 0,
            string_table: vec!["hello".to_string(), "world".to_string()],
        }
    }

    #[test]
    fn test_round_trip() {
        let module = sample_module();
        let bytes = serialize(&module).unwrap();
        let loaded = deserialize(&bytes).unwrap();
        assert_eq!(module, loaded);
    }

    #[test]
    fn test_magic_and_version() {
        let bytes = serialize(&sample_module()).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), MAGIC);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), VERSION);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = serialize(&sample_module()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            deserialize(&bytes),
            Err(CodecError::InvalidHeader)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = serialize(&sample_module()).unwrap();
        bytes[4..8].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(
            deserialize(&bytes),
            Err(CodecError::UnsupportedVersion)
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = serialize(&sample_module()).unwrap();
        for len in [2, 9, 17, 21, 25] {
            assert!(deserialize(&bytes[..len]).is_err(), "len {len}");
        }
    }

    #[test]
    fn test_serialize_rejects_bad_entry_index() {
        let mut module = sample_module();
        module.entry_index = 3;
        assert!(matches!(
            serialize(&module),
            Err(CodecError::InvalidEntryIndex)
        ));
    }

    #[test]
    fn test_deserialize_rejects_bad_entry_index() {
        let mut bytes = serialize(&sample_module()).unwrap();
        // entryIndex lives at offset 12.
        bytes[12..16].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            deserialize(&bytes),
            Err(CodecError::InvalidEntryIndex)
        ));
    }

    #[test]
    fn test_unknown_opcode_byte() {
        let mut module = sample_module();
        module.string_table.clear();
        let mut bytes = serialize(&module).unwrap();
        // First opcode byte follows header (16) + stringCount (4) +
        // name length prefix (4) + name (5) + instCount (4).
        let op_offset = 16 + 4 + 4 + module.functions[0].name.len() + 4;
        bytes[op_offset] = 0xEE;
        assert!(matches!(
            deserialize(&bytes),
            Err(CodecError::UnknownOpcode)
        ));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.psir");
        let module = sample_module();
        save(&module, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(module, loaded);
    }

    #[test]
    fn test_empty_string_table_round_trip() {
        let mut module = sample_module();
        module.string_table.clear();
        let bytes = serialize(&module).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), module);
    }
}
