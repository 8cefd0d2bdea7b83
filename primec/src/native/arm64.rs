//! arm64 instruction encoding and the open-coded sequences each IR opcode
//! selects.
//!
//! Register conventions: x27 holds the frame base, x28 the operand-stack
//! pointer (full-descending, 16-byte cells with the value in the high
//! 8 bytes). x0/x1 are the working registers for pops and results; x16
//! carries the syscall number for `svc`.
//!
//! Branches and string references are emitted as placeholders and patched
//! once targets are known; the patch functions take signed word deltas.

/// `write(2)` syscall number on macOS.
const SYS_WRITE: u64 = 4;

/// Condition codes for `b.cond`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CondCode {
    Eq = 0x0,
    Ne = 0x1,
    Hs = 0x2,
    Lo = 0x3,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xA,
    Lt = 0xB,
    Gt = 0xC,
    Le = 0xD,
}

impl CondCode {
    fn invert(self) -> CondCode {
        match self {
            CondCode::Eq => CondCode::Ne,
            CondCode::Ne => CondCode::Eq,
            CondCode::Hs => CondCode::Lo,
            CondCode::Lo => CondCode::Hs,
            CondCode::Hi => CondCode::Ls,
            CondCode::Ls => CondCode::Hi,
            CondCode::Ge => CondCode::Lt,
            CondCode::Lt => CondCode::Ge,
            CondCode::Gt => CondCode::Le,
            CondCode::Le => CondCode::Gt,
        }
    }
}

/// Byte offset of local slot `index` from the frame base.
pub(super) fn local_offset(index: u32) -> u64 {
    u64::from(index) * 16 + 8
}

#[derive(Debug, Default)]
pub(super) struct Arm64Emitter {
    code: Vec<u32>,
    frame_size: u64,
    code_base_offset: u64,
}

impl Arm64Emitter {
    const MAX_LDR_STR_OFFSET_BYTES: u64 = 0xFFF * 8;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_function(&mut self, frame_size: u64) {
        self.frame_size = frame_size;
        if frame_size > 0 {
            self.emit_adjust_sp(frame_size, false);
        }
        self.emit(encode_add_reg_imm(27, 31, 0));
        if frame_size == 0 {
            self.emit(encode_add_reg_imm(28, 27, 0));
        } else if frame_size <= 4095 {
            self.emit(encode_add_reg_imm(28, 27, frame_size as u16));
        } else {
            self.emit_mov_imm64(9, frame_size);
            self.emit(encode_add_reg(28, 27, 9));
        }
    }

    pub fn current_word_index(&self) -> usize {
        self.code.len()
    }

    pub fn set_code_base_offset(&mut self, offset_bytes: u32) {
        self.code_base_offset = u64::from(offset_bytes);
    }

    pub fn finalize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.code.len() * 4);
        for word in &self.code {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn emit_push_i32(&mut self, value: i32) {
        self.emit_mov_imm64(0, value as i64 as u64);
        self.emit_push_reg(0);
    }

    pub fn emit_push_i64(&mut self, value: u64) {
        self.emit_mov_imm64(0, value);
        self.emit_push_reg(0);
    }

    pub fn emit_load_local(&mut self, index: u32) {
        self.emit_load_local_to_reg(0, index);
        self.emit_push_reg(0);
    }

    pub fn emit_load_local_to_reg(&mut self, reg: u8, index: u32) {
        let offset = local_offset(index);
        if offset <= Self::MAX_LDR_STR_OFFSET_BYTES {
            self.emit(encode_ldr_reg_base(reg, 27, offset as u16));
        } else {
            let tmp = if reg == 1 { 2 } else { 1 };
            self.emit_mov_imm64(tmp, offset);
            self.emit(encode_add_reg(tmp, 27, tmp));
            self.emit(encode_ldr_reg_base(reg, tmp, 0));
        }
    }

    pub fn emit_store_local(&mut self, index: u32) {
        self.emit_pop_reg(0);
        self.emit_store_local_from_reg(index, 0);
    }

    pub fn emit_store_local_from_reg(&mut self, index: u32, reg: u8) {
        let offset = local_offset(index);
        if offset <= Self::MAX_LDR_STR_OFFSET_BYTES {
            self.emit(encode_str_reg_base(reg, 27, offset as u16));
        } else {
            let tmp = if reg == 1 { 2 } else { 1 };
            self.emit_mov_imm64(tmp, offset);
            self.emit(encode_add_reg(tmp, 27, tmp));
            self.emit(encode_str_reg_base(reg, tmp, 0));
        }
    }

    pub fn emit_address_of_local(&mut self, index: u32) {
        let offset = local_offset(index);
        if offset <= 4095 {
            self.emit(encode_add_reg_imm(0, 27, offset as u16));
        } else {
            self.emit_mov_imm64(1, offset);
            self.emit(encode_add_reg(0, 27, 1));
        }
        self.emit_push_reg(0);
    }

    pub fn emit_load_indirect(&mut self) {
        self.emit_pop_reg(0);
        self.emit(encode_ldr_reg_base(1, 0, 0));
        self.emit_push_reg(1);
    }

    pub fn emit_store_indirect(&mut self) {
        self.emit_pop_reg(0);
        self.emit_pop_reg(1);
        self.emit(encode_str_reg_base(0, 1, 0));
        self.emit_push_reg(0);
    }

    pub fn emit_dup(&mut self) {
        self.emit_pop_reg(0);
        self.emit_push_reg(0);
        self.emit_push_reg(0);
    }

    pub fn emit_pop(&mut self) {
        self.emit_pop_reg(0);
    }

    pub fn emit_add(&mut self) {
        self.emit_binary_op(encode_add_reg(0, 1, 0));
    }

    pub fn emit_sub(&mut self) {
        self.emit_binary_op(encode_sub_reg(0, 1, 0));
    }

    pub fn emit_mul(&mut self) {
        self.emit_binary_op(encode_mul_reg(0, 1, 0));
    }

    pub fn emit_div(&mut self) {
        self.emit_binary_op(encode_sdiv_reg(0, 1, 0));
    }

    pub fn emit_div_unsigned(&mut self) {
        self.emit_binary_op(encode_udiv_reg(0, 1, 0));
    }

    pub fn emit_neg(&mut self) {
        self.emit_pop_reg(0);
        self.emit(encode_sub_reg(0, 31, 0));
        self.emit_push_reg(0);
    }

    pub fn emit_compare(&mut self, cond: CondCode) {
        self.emit_pop_reg(0);
        self.emit_pop_reg(1);
        self.emit(encode_subs_reg(31, 1, 0));
        // Offsets assume emit_mov_imm64 is 4 words and emit_push_reg is 2.
        self.emit(encode_b_cond(6, cond));
        self.emit_mov_imm64(0, 0);
        self.emit(encode_b(5));
        self.emit_mov_imm64(0, 1);
        self.emit_push_reg(0);
    }

    /// Unconditional branch placeholder; returns the word index to patch.
    pub fn emit_jump_placeholder(&mut self) -> usize {
        let index = self.current_word_index();
        self.emit(encode_b(0));
        index
    }

    /// Pop the condition and branch on zero; returns the `cbz` word index.
    pub fn emit_jump_if_zero_placeholder(&mut self) -> usize {
        self.emit_pop_reg(0);
        let index = self.current_word_index();
        self.emit(encode_cbz(0, 0));
        index
    }

    pub fn patch_jump(&mut self, index: usize, offset_words: i32) {
        self.patch_word(index, encode_b(offset_words));
    }

    pub fn patch_jump_if_zero(&mut self, index: usize, offset_words: i32) {
        self.patch_word(index, encode_cbz(0, offset_words));
    }

    pub fn emit_return(&mut self) {
        self.emit_pop_reg(0);
        if self.frame_size > 0 {
            self.emit_adjust_sp(self.frame_size, true);
        }
        self.emit(encode_ret());
    }

    pub fn emit_return_void(&mut self) {
        self.emit_mov_imm64(0, 0);
        if self.frame_size > 0 {
            self.emit_adjust_sp(self.frame_size, true);
        }
        self.emit(encode_ret());
    }

    /// Pop a signed value and write it in decimal, sign included.
    pub fn emit_print_signed(
        &mut self,
        scratch_offset: u32,
        scratch_bytes: u32,
        newline: bool,
        fd: u64,
    ) {
        self.emit_pop_reg(0);
        self.emit_compare_reg_zero(0);
        let non_negative = self.emit_cond_branch_placeholder(CondCode::Ge);
        self.emit(encode_sub_reg(0, 31, 0));
        self.emit_mov_imm64(5, 1);
        let after_sign = self.emit_jump_placeholder();
        let non_negative_index = self.current_word_index();
        self.patch_cond_branch(
            non_negative,
            (non_negative_index - non_negative) as i32,
            CondCode::Ge,
        );
        self.emit_mov_imm64(5, 0);
        let after_sign_index = self.current_word_index();
        self.patch_jump(after_sign, (after_sign_index - after_sign) as i32);
        self.emit_print_unsigned_internal(scratch_offset, scratch_bytes, true, 5, newline, fd);
    }

    /// Pop an unsigned value and write it in decimal.
    pub fn emit_print_unsigned(
        &mut self,
        scratch_offset: u32,
        scratch_bytes: u32,
        newline: bool,
        fd: u64,
    ) {
        self.emit_pop_reg(0);
        self.emit_print_unsigned_internal(scratch_offset, scratch_bytes, false, 0, newline, fd);
    }

    /// Write an interned string; the string address is an ADR placeholder
    /// patched against the literal pool. Returns the placeholder index.
    pub fn emit_print_string_placeholder(
        &mut self,
        length_bytes: u64,
        scratch_offset: u32,
        newline: bool,
        fd: u64,
    ) -> usize {
        let fixup_index = self.emit_adr_placeholder(1);
        self.emit_mov_imm64(2, length_bytes);
        self.emit_write_syscall(fd, 1, 2);
        if newline {
            self.emit_write_newline(fd, scratch_offset);
        }
        fixup_index
    }

    /// Pop a byte offset and load one byte of an interned string. Returns
    /// the ADR placeholder index.
    pub fn emit_load_string_byte_placeholder(&mut self) -> usize {
        self.emit_pop_reg(0);
        let fixup_index = self.emit_adr_placeholder(1);
        self.emit(encode_add_reg(1, 1, 0));
        self.emit(encode_ldrb_reg_base(2, 1, 0));
        self.emit_push_reg(2);
        fixup_index
    }

    /// Pop an argv index, guard it (negative, >= argc, NULL entry all skip
    /// the write), measure the NUL-terminated string, and write it.
    pub fn emit_print_argv(
        &mut self,
        argc_local_index: u32,
        argv_local_index: u32,
        scratch_offset: u32,
        newline: bool,
        fd: u64,
    ) {
        self.emit_pop_reg(0);
        self.emit_compare_reg_zero(0);
        let negative_branch = self.emit_cond_branch_placeholder(CondCode::Lt);

        self.emit_load_local_to_reg(1, argc_local_index);
        self.emit(encode_subs_reg(31, 0, 1));
        let oob_branch = self.emit_cond_branch_placeholder(CondCode::Ge);

        self.emit_load_local_to_reg(2, argv_local_index);
        self.emit_mov_imm64(3, 8);
        self.emit(encode_mul_reg(3, 0, 3));
        self.emit(encode_add_reg(2, 2, 3));
        self.emit(encode_ldr_reg_base(1, 2, 0));
        self.emit_compare_reg_zero(1);
        let null_branch = self.emit_cond_branch_placeholder(CondCode::Eq);

        // Scan for the terminating NUL: x3 cursor, x2 length.
        self.emit(encode_add_reg_imm(3, 1, 0));
        self.emit_mov_imm64(2, 0);
        let loop_start = self.current_word_index();
        self.emit(encode_ldrb_reg_base(4, 3, 0));
        self.emit_compare_reg_zero(4);
        let done_branch = self.emit_cond_branch_placeholder(CondCode::Eq);
        self.emit(encode_add_reg_imm(2, 2, 1));
        self.emit(encode_add_reg_imm(3, 3, 1));
        let loop_jump = self.emit_jump_placeholder();
        self.patch_jump(loop_jump, loop_start as i32 - loop_jump as i32);
        let done_index = self.current_word_index();
        self.patch_cond_branch(done_branch, (done_index - done_branch) as i32, CondCode::Eq);

        self.emit_write_syscall(fd, 1, 2);
        if newline {
            self.emit_write_newline(fd, scratch_offset);
        }

        let skip_index = self.current_word_index();
        self.patch_cond_branch(
            negative_branch,
            (skip_index - negative_branch) as i32,
            CondCode::Lt,
        );
        self.patch_cond_branch(oob_branch, (skip_index - oob_branch) as i32, CondCode::Ge);
        self.patch_cond_branch(null_branch, (skip_index - null_branch) as i32, CondCode::Eq);
    }

    /// Rewrite an ADR placeholder as an `adrp`+`add` pair reaching
    /// `delta_bytes` away from the placeholder.
    pub fn patch_adr(&mut self, index: usize, rd: u8, delta_bytes: i32) {
        let instr_addr = self.code_base_offset + index as u64 * 4;
        let target_addr = instr_addr.wrapping_add(delta_bytes as i64 as u64);
        let instr_page = instr_addr & !0xFFF;
        let target_page = target_addr & !0xFFF;
        let page_delta = target_page as i64 - instr_page as i64;
        let page_imm = (page_delta >> 12) as i32;
        self.patch_word(index, encode_adrp(rd, page_imm));
        let lo12 = (target_addr & 0xFFF) as u16;
        self.patch_word(index + 1, encode_add_reg_imm(rd, rd, lo12));
    }

    fn emit(&mut self, word: u32) {
        self.code.push(word);
    }

    fn patch_word(&mut self, index: usize, word: u32) {
        if index < self.code.len() {
            self.code[index] = word;
        }
    }

    fn emit_binary_op(&mut self, op_word: u32) {
        self.emit_pop_reg(0);
        self.emit_pop_reg(1);
        self.emit(op_word);
        self.emit_push_reg(0);
    }

    fn emit_compare_reg_zero(&mut self, reg: u8) {
        self.emit(encode_subs_reg(31, reg, 31));
    }

    /// Two-word placeholder: `b.cond` over an unconditional `b`. Patched by
    /// [`Self::patch_cond_branch`], which picks whichever word reaches.
    fn emit_cond_branch_placeholder(&mut self, cond: CondCode) -> usize {
        let index = self.current_word_index();
        self.emit(encode_b_cond(0, cond));
        self.emit(encode_b(0));
        index
    }

    fn patch_cond_branch(&mut self, index: usize, offset_words: i32, cond: CondCode) {
        const MIN_COND: i32 = -(1 << 18);
        const MAX_COND: i32 = (1 << 18) - 1;
        if (MIN_COND..=MAX_COND).contains(&offset_words) {
            self.patch_word(index, encode_b_cond(offset_words, cond));
            self.patch_word(index + 1, encode_b(1));
            return;
        }
        self.patch_word(index, encode_b_cond(2, cond.invert()));
        self.patch_word(index + 1, encode_b(offset_words - 1));
    }

    fn emit_cbz_placeholder(&mut self, reg: u8) -> usize {
        let index = self.current_word_index();
        self.emit(encode_cbz(reg, 0));
        index
    }

    fn patch_cbz(&mut self, index: usize, reg: u8, offset_words: i32) {
        self.patch_word(index, encode_cbz(reg, offset_words));
    }

    fn emit_push_reg(&mut self, reg: u8) {
        self.emit(encode_sub_reg_imm(28, 28, 16));
        self.emit(encode_str_reg_base(reg, 28, 8));
    }

    fn emit_pop_reg(&mut self, reg: u8) {
        self.emit(encode_ldr_reg_base(reg, 28, 8));
        self.emit(encode_add_reg_imm(28, 28, 16));
    }

    fn emit_mov_imm64(&mut self, rd: u8, value: u64) {
        self.emit(encode_movz(rd, (value & 0xFFFF) as u16, 0));
        self.emit(encode_movk(rd, ((value >> 16) & 0xFFFF) as u16, 16));
        self.emit(encode_movk(rd, ((value >> 32) & 0xFFFF) as u16, 32));
        self.emit(encode_movk(rd, ((value >> 48) & 0xFFFF) as u16, 48));
    }

    fn emit_adjust_sp(&mut self, amount: u64, add: bool) {
        const CHUNK: u64 = 4080;
        let mut remaining = amount;
        while remaining > 4095 {
            self.emit(if add {
                encode_add_sp_imm(CHUNK as u16)
            } else {
                encode_sub_sp_imm(CHUNK as u16)
            });
            remaining -= CHUNK;
        }
        if remaining > 0 {
            self.emit(if add {
                encode_add_sp_imm(remaining as u16)
            } else {
                encode_sub_sp_imm(remaining as u16)
            });
        }
    }

    fn emit_adr_placeholder(&mut self, rd: u8) -> usize {
        let index = self.current_word_index();
        self.emit(encode_adrp(rd, 0));
        self.emit(encode_add_reg_imm(rd, rd, 0));
        index
    }

    fn emit_write_syscall(&mut self, fd: u64, buffer_reg: u8, length_reg: u8) {
        self.emit_mov_imm64(0, fd);
        self.emit(encode_add_reg_imm(1, buffer_reg, 0));
        self.emit(encode_add_reg_imm(2, length_reg, 0));
        self.emit_mov_imm64(16, SYS_WRITE);
        self.emit(encode_svc());
    }

    fn emit_write_newline(&mut self, fd: u64, scratch_offset: u32) {
        self.emit_load_frame_offset(1, scratch_offset);
        self.emit_mov_imm64(4, u64::from(b'\n'));
        self.emit(encode_strb_reg_base(4, 1, 0));
        self.emit_mov_imm64(2, 1);
        self.emit_write_syscall(fd, 1, 2);
    }

    fn emit_load_frame_offset(&mut self, rd: u8, offset_bytes: u32) {
        if offset_bytes <= 4095 {
            self.emit(encode_add_reg_imm(rd, 27, offset_bytes as u16));
            return;
        }
        self.emit_mov_imm64(9, u64::from(offset_bytes));
        self.emit(encode_add_reg(rd, 27, 9));
    }

    fn emit_add_offset(&mut self, rd: u8, rn: u8, offset_bytes: u32) {
        if offset_bytes <= 4095 {
            self.emit(encode_add_reg_imm(rd, rn, offset_bytes as u16));
            return;
        }
        self.emit_mov_imm64(9, u64::from(offset_bytes));
        self.emit(encode_add_reg(rd, rn, 9));
    }

    /// Convert x0 to decimal digits (high-to-low into the scratch buffer),
    /// prefix '-' when `sign_reg` is nonzero, and write the result.
    fn emit_print_unsigned_internal(
        &mut self,
        scratch_offset: u32,
        scratch_bytes: u32,
        include_sign: bool,
        sign_reg: u8,
        newline: bool,
        fd: u64,
    ) {
        self.emit_load_frame_offset(1, scratch_offset);
        self.emit_add_offset(1, 1, scratch_bytes);
        self.emit(encode_add_reg_imm(2, 1, 0));
        if newline {
            self.emit(encode_sub_reg_imm(2, 2, 1));
            self.emit_mov_imm64(4, u64::from(b'\n'));
            self.emit(encode_strb_reg_base(4, 2, 0));
        }
        self.emit_mov_imm64(10, 10);

        let loop_start = self.current_word_index();
        self.emit(encode_udiv_reg(3, 0, 10));
        self.emit(encode_mul_reg(4, 3, 10));
        self.emit(encode_sub_reg(4, 0, 4));
        self.emit(encode_add_reg_imm(4, 4, u16::from(b'0')));
        self.emit(encode_sub_reg_imm(2, 2, 1));
        self.emit(encode_strb_reg_base(4, 2, 0));
        self.emit(encode_add_reg_imm(0, 3, 0));
        let done_branch = self.emit_cbz_placeholder(0);
        let jump_back = self.emit_jump_placeholder();
        self.patch_jump(jump_back, loop_start as i32 - jump_back as i32);
        let done_index = self.current_word_index();
        self.patch_cbz(done_branch, 0, (done_index - done_branch) as i32);

        if include_sign {
            let skip_sign = self.emit_cbz_placeholder(sign_reg);
            self.emit(encode_sub_reg_imm(2, 2, 1));
            self.emit_mov_imm64(4, u64::from(b'-'));
            self.emit(encode_strb_reg_base(4, 2, 0));
            let after_sign = self.current_word_index();
            self.patch_cbz(skip_sign, sign_reg, (after_sign - skip_sign) as i32);
        }

        self.emit(encode_sub_reg(3, 1, 2));
        self.emit_write_syscall(fd, 2, 3);
    }
}

fn encode_add_sp_imm(imm: u16) -> u32 {
    0x9100_03FF | ((u32::from(imm) & 0xFFF) << 10)
}

fn encode_sub_sp_imm(imm: u16) -> u32 {
    0xD100_03FF | ((u32::from(imm) & 0xFFF) << 10)
}

fn encode_add_reg_imm(rd: u8, rn: u8, imm: u16) -> u32 {
    0x9100_0000 | ((u32::from(imm) & 0xFFF) << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_sub_reg_imm(rd: u8, rn: u8, imm: u16) -> u32 {
    0xD100_0000 | ((u32::from(imm) & 0xFFF) << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_str_reg_base(rt: u8, rn: u8, offset_bytes: u16) -> u32 {
    let imm = u32::from(offset_bytes / 8) & 0xFFF;
    0xF900_0000 | (imm << 10) | (u32::from(rn) << 5) | (u32::from(rt) & 0x1F)
}

fn encode_ldr_reg_base(rt: u8, rn: u8, offset_bytes: u16) -> u32 {
    let imm = u32::from(offset_bytes / 8) & 0xFFF;
    0xF940_0000 | (imm << 10) | (u32::from(rn) << 5) | (u32::from(rt) & 0x1F)
}

fn encode_strb_reg_base(rt: u8, rn: u8, offset_bytes: u16) -> u32 {
    let imm = u32::from(offset_bytes) & 0xFFF;
    0x3900_0000 | (imm << 10) | (u32::from(rn) << 5) | (u32::from(rt) & 0x1F)
}

fn encode_ldrb_reg_base(rt: u8, rn: u8, offset_bytes: u16) -> u32 {
    let imm = u32::from(offset_bytes) & 0xFFF;
    0x3940_0000 | (imm << 10) | (u32::from(rn) << 5) | (u32::from(rt) & 0x1F)
}

fn encode_add_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x8B00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_sub_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xCB00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_subs_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0xEB00_0000 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_mul_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9B00_7C00 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_sdiv_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_0C00 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_udiv_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    0x9AC0_0800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

fn encode_movz(rd: u8, imm: u16, shift: u8) -> u32 {
    let shift_field = u32::from(shift / 16) & 0x3;
    0xD280_0000 | (shift_field << 21) | (u32::from(imm) << 5) | u32::from(rd)
}

fn encode_movk(rd: u8, imm: u16, shift: u8) -> u32 {
    let shift_field = u32::from(shift / 16) & 0x3;
    0xF280_0000 | (shift_field << 21) | (u32::from(imm) << 5) | u32::from(rd)
}

fn encode_adrp(rd: u8, imm21: i32) -> u32 {
    let imm = (imm21 as u32) & 0x1F_FFFF;
    let immlo = imm & 0x3;
    let immhi = (imm >> 2) & 0x7_FFFF;
    0x9000_0000 | (immlo << 29) | (immhi << 5) | u32::from(rd)
}

fn encode_b(imm26: i32) -> u32 {
    0x1400_0000 | ((imm26 as u32) & 0x03FF_FFFF)
}

fn encode_b_cond(imm19: i32, cond: CondCode) -> u32 {
    let imm = (imm19 as u32) & 0x7_FFFF;
    0x5400_0000 | (imm << 5) | (cond as u32 & 0xF)
}

fn encode_cbz(rt: u8, imm19: i32) -> u32 {
    let imm = (imm19 as u32) & 0x7_FFFF;
    0xB400_0000 | (imm << 5) | (u32::from(rt) & 0x1F)
}

fn encode_svc() -> u32 {
    // svc #0x80, the BSD syscall gate.
    0xD400_1001
}

fn encode_ret() -> u32 {
    0xD65F_03C0
}
