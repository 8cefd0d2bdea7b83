//! Direct-to-machine-code backend: IR module in, signed arm64 Mach-O
//! executable out, no external assembler or linker.
//!
//! Emission runs in three passes. Instruction selection walks the entry
//! function once, open-coding each opcode and recording branch and string
//! references as placeholders; a fixup pass rewrites them once every
//! target's code offset is known; the image pass wraps the code and string
//! pool in Mach-O load commands and signs the result.
//!
//! Image construction is a pure function and compiles on every host; only
//! [`NativeEmitter::emit_executable`] gates on macOS/arm64 before touching
//! the filesystem.

mod arm64;
mod macho;
mod sign;
mod stack_depth;

use std::path::Path;

use thiserror::Error;

use crate::ir::{print_flags, print_string_index, IrModule, IrOpcode, PRINT_FLAG_NEWLINE,
    PRINT_FLAG_STDERR};

use arm64::{Arm64Emitter, CondCode};

const PRINT_SCRATCH_BYTES: u32 = 32;
const PRINT_SCRATCH_SLOTS: u32 = PRINT_SCRATCH_BYTES.div_ceil(16);
const MAX_LOCALS: usize = 2047;

/// Native backend errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("native backend is only supported on macOS")]
    UnsupportedOs,
    #[error("native backend requires arm64")]
    UnsupportedArch,
    #[error("invalid IR entry index")]
    InvalidEntryIndex,
    #[error("native backend requires at least one instruction")]
    EmptyFunction,
    #[error("native backend detected invalid stack usage at instruction {index} ({opcode})")]
    InvalidStackUsage { index: usize, opcode: &'static str },
    #[error("native backend detected inconsistent stack depth at instruction {index} ({opcode})")]
    InconsistentStackDepth { index: usize, opcode: &'static str },
    #[error("native backend detected invalid jump target")]
    InvalidJumpTarget,
    #[error("native backend supports up to 2048 locals")]
    TooManyLocals,
    #[error("native backend jump offset out of range")]
    JumpOffsetOutOfRange,
    #[error("native backend string literal out of range")]
    StringLiteralOutOfRange,
    #[error("native backend encountered invalid string index")]
    InvalidStringIndex,
    #[error("native backend requires non-empty code")]
    EmptyCode,
    #[error("invalid code signature limit")]
    InvalidCodeLimit,
    #[error("code signature size mismatch")]
    SignatureSizeMismatch,
    #[error("failed to open output file")]
    OpenOutput,
    #[error("failed to write output file")]
    WriteOutput,
    #[error("failed to set executable permissions")]
    SetPermissions,
    #[error("failed to move output file into place")]
    MoveOutput,
}

struct BranchFixup {
    code_index: usize,
    target_inst: usize,
    conditional: bool,
}

struct StringFixup {
    code_index: usize,
    string_index: u32,
}

/// Emits a signed Mach-O executable for an IR module.
#[derive(Debug, Default)]
pub struct NativeEmitter;

impl NativeEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Compile `module` and install the executable at `output_path`.
    pub fn emit_executable<P: AsRef<Path>>(
        &self,
        module: &IrModule,
        output_path: P,
    ) -> Result<(), EmitError> {
        if !cfg!(target_os = "macos") {
            return Err(EmitError::UnsupportedOs);
        }
        if !cfg!(target_arch = "aarch64") {
            return Err(EmitError::UnsupportedArch);
        }
        let image = build_image(module)?;
        write_binary_file(output_path.as_ref(), &image)
    }
}

/// Build the complete executable image for `module`. Pure: identical
/// modules produce byte-identical images.
pub fn build_image(module: &IrModule) -> Result<Vec<u8>, EmitError> {
    let function = module
        .entry_function()
        .ok_or(EmitError::InvalidEntryIndex)?;

    let mut local_count = 0usize;
    let mut needs_print_scratch = false;
    let mut needs_argc = false;
    let mut needs_argv = false;
    for inst in &function.instructions {
        match inst.op {
            IrOpcode::LoadLocal | IrOpcode::StoreLocal | IrOpcode::AddressOfLocal => {
                local_count = local_count.max(inst.imm as usize + 1);
            }
            IrOpcode::PrintI32
            | IrOpcode::PrintI64
            | IrOpcode::PrintU64
            | IrOpcode::PrintString => {
                needs_print_scratch = true;
            }
            IrOpcode::PrintArgv | IrOpcode::PrintArgvUnsafe => {
                needs_print_scratch = true;
                needs_argc = true;
                needs_argv = true;
            }
            IrOpcode::PushArgc => {
                needs_argc = true;
            }
            _ => {}
        }
    }
    let max_stack = stack_depth::compute_max_stack_depth(function)?;

    let mut argc_local_index = 0u32;
    let mut argv_local_index = 0u32;
    if needs_argc {
        argc_local_index = local_count as u32;
        local_count += 1;
    }
    if needs_argv {
        argv_local_index = local_count as u32;
        local_count += 1;
    }
    if local_count > MAX_LOCALS {
        return Err(EmitError::TooManyLocals);
    }
    let scratch_slots = if needs_print_scratch {
        PRINT_SCRATCH_SLOTS
    } else {
        0
    };
    let scratch_bytes = scratch_slots * 16;
    let scratch_offset = local_count as u32 * 16;
    let locals_size = (local_count as u64 + u64::from(scratch_slots)) * 16;
    let stack_size = max_stack as u64 * 16;
    let frame_size = macho::align_to(locals_size + stack_size, 16);

    let mut emitter = Arm64Emitter::new();
    emitter.begin_function(frame_size);
    // LC_MAIN entry: x0 carries argc, x1 argv.
    if needs_argc {
        emitter.emit_store_local_from_reg(argc_local_index, 0);
    }
    if needs_argv {
        emitter.emit_store_local_from_reg(argv_local_index, 1);
    }

    let mut string_offsets = Vec::with_capacity(module.string_table.len());
    let mut string_data: Vec<u8> = Vec::new();
    for text in &module.string_table {
        string_offsets.push(string_data.len() as u64);
        string_data.extend_from_slice(text.as_bytes());
        string_data.push(0);
    }

    let mut fixups: Vec<BranchFixup> = Vec::new();
    let mut string_fixups: Vec<StringFixup> = Vec::new();
    let mut inst_offsets = vec![0usize; function.instructions.len() + 1];

    for (index, inst) in function.instructions.iter().enumerate() {
        inst_offsets[index] = emitter.current_word_index();
        match inst.op {
            IrOpcode::PushI32 => emitter.emit_push_i32(inst.imm as u32 as i32),
            IrOpcode::PushI64 => emitter.emit_push_i64(inst.imm),
            IrOpcode::PushArgc => emitter.emit_load_local(argc_local_index),
            IrOpcode::LoadLocal => emitter.emit_load_local(inst.imm as u32),
            IrOpcode::StoreLocal => emitter.emit_store_local(inst.imm as u32),
            IrOpcode::AddressOfLocal => emitter.emit_address_of_local(inst.imm as u32),
            IrOpcode::LoadIndirect => emitter.emit_load_indirect(),
            IrOpcode::StoreIndirect => emitter.emit_store_indirect(),
            IrOpcode::Dup => emitter.emit_dup(),
            IrOpcode::Pop => emitter.emit_pop(),
            IrOpcode::AddI32 | IrOpcode::AddI64 => emitter.emit_add(),
            IrOpcode::SubI32 | IrOpcode::SubI64 => emitter.emit_sub(),
            IrOpcode::MulI32 | IrOpcode::MulI64 => emitter.emit_mul(),
            IrOpcode::DivI32 | IrOpcode::DivI64 => emitter.emit_div(),
            IrOpcode::DivU64 => emitter.emit_div_unsigned(),
            IrOpcode::NegI32 | IrOpcode::NegI64 => emitter.emit_neg(),
            IrOpcode::CmpEqI32 | IrOpcode::CmpEqI64 => emitter.emit_compare(CondCode::Eq),
            IrOpcode::CmpNeI32 | IrOpcode::CmpNeI64 => emitter.emit_compare(CondCode::Ne),
            IrOpcode::CmpLtI32 | IrOpcode::CmpLtI64 => emitter.emit_compare(CondCode::Lt),
            IrOpcode::CmpLeI32 | IrOpcode::CmpLeI64 => emitter.emit_compare(CondCode::Le),
            IrOpcode::CmpGtI32 | IrOpcode::CmpGtI64 => emitter.emit_compare(CondCode::Gt),
            IrOpcode::CmpGeI32 | IrOpcode::CmpGeI64 => emitter.emit_compare(CondCode::Ge),
            IrOpcode::CmpLtU64 => emitter.emit_compare(CondCode::Lo),
            IrOpcode::CmpLeU64 => emitter.emit_compare(CondCode::Ls),
            IrOpcode::CmpGtU64 => emitter.emit_compare(CondCode::Hi),
            IrOpcode::CmpGeU64 => emitter.emit_compare(CondCode::Hs),
            IrOpcode::Jump => {
                fixups.push(BranchFixup {
                    code_index: emitter.emit_jump_placeholder(),
                    target_inst: inst.imm as usize,
                    conditional: false,
                });
            }
            IrOpcode::JumpIfZero => {
                fixups.push(BranchFixup {
                    code_index: emitter.emit_jump_if_zero_placeholder(),
                    target_inst: inst.imm as usize,
                    conditional: true,
                });
            }
            IrOpcode::ReturnVoid => emitter.emit_return_void(),
            IrOpcode::ReturnI32 | IrOpcode::ReturnI64 => emitter.emit_return(),
            IrOpcode::PrintI32 | IrOpcode::PrintI64 => {
                let (newline, fd) = print_destination(inst.imm);
                emitter.emit_print_signed(scratch_offset, scratch_bytes, newline, fd);
            }
            IrOpcode::PrintU64 => {
                let (newline, fd) = print_destination(inst.imm);
                emitter.emit_print_unsigned(scratch_offset, scratch_bytes, newline, fd);
            }
            IrOpcode::PrintString => {
                let string_index = print_string_index(inst.imm);
                let text = module
                    .string_table
                    .get(string_index as usize)
                    .ok_or(EmitError::InvalidStringIndex)?;
                let (newline, fd) = print_destination(inst.imm);
                let fixup_index = emitter.emit_print_string_placeholder(
                    text.len() as u64,
                    scratch_offset,
                    newline,
                    fd,
                );
                string_fixups.push(StringFixup {
                    code_index: fixup_index,
                    string_index,
                });
            }
            IrOpcode::PrintArgv | IrOpcode::PrintArgvUnsafe => {
                let (newline, fd) = print_destination(inst.imm);
                emitter.emit_print_argv(
                    argc_local_index,
                    argv_local_index,
                    scratch_offset,
                    newline,
                    fd,
                );
            }
            IrOpcode::LoadStringByte => {
                if inst.imm >= module.string_table.len() as u64 {
                    return Err(EmitError::InvalidStringIndex);
                }
                let fixup_index = emitter.emit_load_string_byte_placeholder();
                string_fixups.push(StringFixup {
                    code_index: fixup_index,
                    string_index: inst.imm as u32,
                });
            }
        }
    }
    inst_offsets[function.instructions.len()] = emitter.current_word_index();

    const IMM19_MIN: i64 = -(1 << 18);
    const IMM19_MAX: i64 = (1 << 18) - 1;
    const IMM26_MIN: i64 = -(1 << 25);
    const IMM26_MAX: i64 = (1 << 25) - 1;
    for fixup in &fixups {
        if fixup.target_inst > function.instructions.len() {
            return Err(EmitError::InvalidJumpTarget);
        }
        let delta = inst_offsets[fixup.target_inst] as i64 - fixup.code_index as i64;
        if fixup.conditional {
            if !(IMM19_MIN..=IMM19_MAX).contains(&delta) {
                return Err(EmitError::JumpOffsetOutOfRange);
            }
            emitter.patch_jump_if_zero(fixup.code_index, delta as i32);
        } else {
            if !(IMM26_MIN..=IMM26_MAX).contains(&delta) {
                return Err(EmitError::JumpOffsetOutOfRange);
            }
            emitter.patch_jump(fixup.code_index, delta as i32);
        }
    }

    if !string_fixups.is_empty() {
        let string_base_offset = emitter.current_word_index() as u64 * 4;
        emitter.set_code_base_offset(macho::code_offset());
        const ADR_MIN: i64 = -(1 << 20);
        const ADR_MAX: i64 = (1 << 20) - 1;
        for fixup in &string_fixups {
            let target_offset =
                (string_base_offset + string_offsets[fixup.string_index as usize]) as i64;
            let instr_offset = fixup.code_index as i64 * 4;
            let delta = target_offset - instr_offset;
            if !(ADR_MIN..=ADR_MAX).contains(&delta) {
                return Err(EmitError::StringLiteralOutOfRange);
            }
            emitter.patch_adr(fixup.code_index, 1, delta as i32);
        }
    }

    let mut code = emitter.finalize();
    code.extend_from_slice(&string_data);
    macho::build_image(&code)
}

fn print_destination(imm: u64) -> (bool, u64) {
    let flags = print_flags(imm);
    let newline = flags & PRINT_FLAG_NEWLINE != 0;
    let fd = if flags & PRINT_FLAG_STDERR != 0 { 2 } else { 1 };
    (newline, fd)
}

/// Write `data` to a temporary sibling of `path`, mark it executable, and
/// rename it into place so a previously running inode is left untouched.
pub(crate) fn write_binary_file(path: &Path, data: &[u8]) -> Result<(), EmitError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or(EmitError::OpenOutput)?
        .to_string_lossy()
        .into_owned();
    let temp_path = parent.join(format!("{}.tmp.{}", file_name, std::process::id()));

    let _ = std::fs::remove_file(&temp_path);

    if std::fs::write(&temp_path, data).is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(EmitError::WriteOutput);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = match std::fs::metadata(&temp_path) {
            Ok(metadata) => metadata.permissions(),
            Err(_) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(EmitError::SetPermissions);
            }
        };
        let mut permissions = permissions;
        permissions.set_mode(permissions.mode() | 0o111);
        if std::fs::set_permissions(&temp_path, permissions).is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return Err(EmitError::SetPermissions);
        }
    }

    let _ = std::fs::remove_file(path);
    if std::fs::rename(&temp_path, path).is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return Err(EmitError::MoveOutput);
    }
    Ok(())
}
