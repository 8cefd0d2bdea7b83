//! Expression lowering.
//!
//! Every expression lowers to a sequence whose net stack effect is +1.
//! Statement context balances with an explicit `Pop`.

use crate::ast::{Expr, ExprKind};
use crate::ir::IrOpcode;

use super::builtins;
use super::types::{combine_numeric_kinds, comparison_kind, BindingKind, StringSource, ValueKind};
use super::{LocalMap, LowerError, Lowerer};

/// True when `expr` evaluates to a pointer: a pointer-typed binding, a
/// `location(...)` call, or pointer arithmetic over one.
pub(super) fn is_pointer_operand(expr: &Expr, locals: &LocalMap) -> bool {
    match expr.kind {
        ExprKind::Name => locals
            .get(&expr.name)
            .map(|info| info.kind == BindingKind::Pointer)
            .unwrap_or(false),
        ExprKind::Call => {
            if builtins::is_simple_call(expr, "location") {
                return true;
            }
            if let Some(name) = builtins::operator_name(expr) {
                if matches!(name, "plus" | "minus") && expr.args.len() == 2 {
                    return is_pointer_operand(&expr.args[0], locals)
                        && !is_pointer_operand(&expr.args[1], locals);
                }
            }
            false
        }
        _ => false,
    }
}

impl<'p> Lowerer<'p> {
    pub(super) fn emit_expr(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        match &expr.kind {
            ExprKind::Literal {
                value,
                width,
                unsigned,
            } => {
                if *width == 64 || *unsigned {
                    self.emit(IrOpcode::PushI64, *value as u64);
                    return Ok(());
                }
                let narrowed = i32::try_from(*value).map_err(|_| LowerError::LiteralOutOfRange)?;
                self.emit(IrOpcode::PushI32, narrowed as u32 as u64);
                Ok(())
            }
            ExprKind::FloatLiteral { .. } => Err(LowerError::FloatLiteral),
            ExprKind::StringLiteral(_) => Err(LowerError::StringLiteralExpr),
            ExprKind::BoolLiteral(value) => {
                self.emit(IrOpcode::PushI32, u64::from(*value));
                Ok(())
            }
            ExprKind::Name => {
                if let Some(info) = locals.get(&expr.name) {
                    self.emit(IrOpcode::LoadLocal, u64::from(info.index));
                    if info.kind == BindingKind::Reference {
                        self.emit(IrOpcode::LoadIndirect, 0);
                    }
                    return Ok(());
                }
                if self.entry_args_name.as_deref() == Some(expr.name.as_str()) {
                    return Err(LowerError::EntryArgsUsage);
                }
                Err(LowerError::UnknownIdentifier(expr.name.clone()))
            }
            ExprKind::Call => self.emit_call_expr(expr, locals),
        }
    }

    fn emit_call_expr(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        if let Some(callee) = self.resolve_definition_call(expr) {
            if !expr.body_arguments.is_empty() {
                return Err(LowerError::CallBlockArguments);
            }
            return self.emit_inline_definition_call(expr, callee, locals, true);
        }
        if builtins::is_simple_call(expr, "count") {
            if expr.args.len() != 1 {
                return Err(LowerError::OneArgument("count".to_string()));
            }
            if self.is_entry_args_name(&expr.args[0], locals) {
                self.emit(IrOpcode::PushArgc, 0);
                return Ok(());
            }
            self.emit_expr(&expr.args[0], locals)?;
            self.emit(IrOpcode::LoadIndirect, 0);
            return Ok(());
        }
        if let Some(print) = builtins::print_builtin(expr) {
            return Err(LowerError::PrintInExpression(print.name.to_string()));
        }
        if let Some(access) = builtins::array_access_name(expr) {
            return self.emit_array_access(expr, locals, access.to_string());
        }
        if let Some(name) = builtins::operator_name(expr) {
            return self.emit_operator(expr, locals, name.to_string());
        }
        if let Some(name) = builtins::comparison_name(expr) {
            return self.emit_comparison(expr, locals, name.to_string());
        }
        if builtins::is_clamp_call(expr) {
            return self.emit_clamp(expr, locals);
        }
        if builtins::is_convert_call(expr) {
            return self.emit_convert(expr, locals);
        }
        if let Some(name) = builtins::pointer_name(expr) {
            return self.emit_pointer_builtin(expr, locals, name.to_string());
        }
        if let Some(name) = builtins::collection_name(expr) {
            if name == "array" {
                return self.emit_array_literal(expr, locals);
            }
            return Err(LowerError::CollectionLiteral(name.to_string()));
        }
        if builtins::is_simple_call(expr, "assign") {
            return self.emit_assign(expr, locals);
        }
        if builtins::is_if_call(expr) || builtins::is_then_call(expr) || builtins::is_else_call(expr)
        {
            return Err(LowerError::IfInExpression);
        }
        Err(LowerError::CallShape)
    }

    /// Push 0/1 for "value != 0" (or "== 0" when `equals`) at the operand's
    /// width.
    pub(super) fn emit_compare_to_zero(
        &mut self,
        kind: ValueKind,
        equals: bool,
    ) -> Result<(), LowerError> {
        match kind {
            ValueKind::Int64 | ValueKind::UInt64 => {
                self.emit(IrOpcode::PushI64, 0);
                self.emit(
                    if equals {
                        IrOpcode::CmpEqI64
                    } else {
                        IrOpcode::CmpNeI64
                    },
                    0,
                );
                Ok(())
            }
            ValueKind::Int32 | ValueKind::Bool => {
                self.emit(IrOpcode::PushI32, 0);
                self.emit(
                    if equals {
                        IrOpcode::CmpEqI32
                    } else {
                        IrOpcode::CmpNeI32
                    },
                    0,
                );
                Ok(())
            }
            _ => Err(LowerError::BoolConversion),
        }
    }

    fn emit_array_access(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        access: String,
    ) -> Result<(), LowerError> {
        if expr.args.len() != 2 {
            return Err(LowerError::TwoArguments(access));
        }
        let target = &expr.args[0];
        if self.is_entry_args_name(target, locals) {
            return Err(LowerError::EntryArgsContext);
        }

        // Byte access on an interned string is a separate path: the length
        // is known at compile time and the load goes through the string
        // table rather than frame slots.
        if target.kind == ExprKind::Name {
            if let Some(info) = locals.get(&target.name) {
                if info.kind == BindingKind::Value && info.value_kind == ValueKind::String {
                    let table_index = match info.string_source {
                        Some(StringSource::Table(index)) => index,
                        _ => return Err(LowerError::StringByteSource),
                    };
                    return self.emit_string_byte_access(expr, locals, &access, table_index);
                }
            }
        }

        let mut elem_kind = ValueKind::Unknown;
        if target.kind == ExprKind::Name {
            if let Some(info) = locals.get(&target.name) {
                if info.kind == BindingKind::Array {
                    elem_kind = info.value_kind;
                }
            }
        } else if target.kind == ExprKind::Call
            && builtins::collection_name(target) == Some("array")
            && target.template_args.len() == 1
        {
            elem_kind = ValueKind::from_type_name(&target.template_args[0]);
        }
        if elem_kind == ValueKind::Unknown || elem_kind == ValueKind::String {
            return Err(LowerError::ArrayElementKind);
        }

        let mut index_kind = self.infer_expr_kind(&expr.args[1], locals)?;
        if index_kind == ValueKind::Bool {
            index_kind = ValueKind::Int32;
        }
        if index_kind != ValueKind::Int32 {
            return Err(LowerError::IndexKind(access));
        }

        let ptr_local = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(ptr_local));

        let index_local = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index_local));

        if access == "at" {
            let count_local = self.alloc_temp_local();
            self.emit(IrOpcode::LoadLocal, u64::from(ptr_local));
            self.emit(IrOpcode::LoadIndirect, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(count_local));

            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::PushI32, 0);
            self.emit(IrOpcode::CmpLtI32, 0);
            let non_negative = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(non_negative, target);

            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::LoadLocal, u64::from(count_local));
            self.emit(IrOpcode::CmpGeI32, 0);
            let in_range = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(in_range, target);
        }

        // Element address: base + (index + 1) * 16.
        self.emit(IrOpcode::LoadLocal, u64::from(ptr_local));
        self.emit(IrOpcode::LoadLocal, u64::from(index_local));
        self.emit(IrOpcode::PushI32, 1);
        self.emit(IrOpcode::AddI32, 0);
        self.emit(IrOpcode::PushI32, 16);
        self.emit(IrOpcode::MulI32, 0);
        self.emit(IrOpcode::AddI64, 0);
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    fn emit_string_byte_access(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        access: &str,
        table_index: u32,
    ) -> Result<(), LowerError> {
        let mut index_kind = self.infer_expr_kind(&expr.args[1], locals)?;
        if index_kind == ValueKind::Bool {
            index_kind = ValueKind::Int32;
        }
        if index_kind != ValueKind::Int32 {
            return Err(LowerError::IndexKind(access.to_string()));
        }

        let index_local = self.alloc_temp_local();
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index_local));

        if access == "at" {
            let length = self.string_table[table_index as usize].len() as u32;
            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::PushI32, 0);
            self.emit(IrOpcode::CmpLtI32, 0);
            let non_negative = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(non_negative, target);

            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::PushI32, u64::from(length));
            self.emit(IrOpcode::CmpGeI32, 0);
            let in_range = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(in_range, target);
        }

        self.emit(IrOpcode::LoadLocal, u64::from(index_local));
        self.emit(IrOpcode::LoadStringByte, u64::from(table_index));
        Ok(())
    }

    fn emit_operator(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        name: String,
    ) -> Result<(), LowerError> {
        if name == "negate" {
            if expr.args.len() != 1 {
                return Err(LowerError::OneArgument(name));
            }
            self.emit_expr(&expr.args[0], locals)?;
            let kind = self.infer_expr_kind(&expr.args[0], locals)?;
            if kind == ValueKind::Bool || kind == ValueKind::Unknown {
                return Err(LowerError::NegateOperand);
            }
            if kind == ValueKind::UInt64 {
                return Err(LowerError::NegateUnsigned);
            }
            self.emit(
                if kind == ValueKind::Int64 {
                    IrOpcode::NegI64
                } else {
                    IrOpcode::NegI32
                },
                0,
            );
            return Ok(());
        }
        if expr.args.len() != 2 {
            return Err(LowerError::TwoArguments(name));
        }

        let mut left_pointer = false;
        let mut right_pointer = false;
        if matches!(name.as_str(), "plus" | "minus") {
            left_pointer = is_pointer_operand(&expr.args[0], locals);
            right_pointer = is_pointer_operand(&expr.args[1], locals);
            if left_pointer && right_pointer {
                return Err(LowerError::PointerPlusPointer);
            }
            if right_pointer {
                return Err(LowerError::PointerOnRight);
            }
            if left_pointer {
                let offset_kind = self.infer_expr_kind(&expr.args[1], locals)?;
                if !matches!(
                    offset_kind,
                    ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64
                ) {
                    return Err(LowerError::PointerOffset);
                }
            }
        }

        self.emit_expr(&expr.args[0], locals)?;
        self.emit_expr(&expr.args[1], locals)?;

        let numeric_kind = combine_numeric_kinds(
            self.infer_expr_kind(&expr.args[0], locals)?,
            self.infer_expr_kind(&expr.args[1], locals)?,
        );
        let pointer = left_pointer || right_pointer;
        if numeric_kind == ValueKind::Unknown && !pointer {
            return Err(LowerError::OperandTypes(name));
        }

        let wide = numeric_kind.is_wide();
        let op = match name.as_str() {
            "plus" => {
                if pointer || wide {
                    IrOpcode::AddI64
                } else {
                    IrOpcode::AddI32
                }
            }
            "minus" => {
                if pointer || wide {
                    IrOpcode::SubI64
                } else {
                    IrOpcode::SubI32
                }
            }
            "multiply" => {
                if wide {
                    IrOpcode::MulI64
                } else {
                    IrOpcode::MulI32
                }
            }
            _ => match numeric_kind {
                ValueKind::UInt64 => IrOpcode::DivU64,
                ValueKind::Int64 => IrOpcode::DivI64,
                _ => IrOpcode::DivI32,
            },
        };
        self.emit(op, 0);
        Ok(())
    }

    fn emit_comparison(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        name: String,
    ) -> Result<(), LowerError> {
        if name == "not" {
            if expr.args.len() != 1 {
                return Err(LowerError::OneArgument(name));
            }
            self.emit_expr(&expr.args[0], locals)?;
            let kind = self.infer_expr_kind(&expr.args[0], locals)?;
            return self.emit_compare_to_zero(kind, true);
        }
        if name == "and" {
            if expr.args.len() != 2 {
                return Err(LowerError::TwoArguments(name));
            }
            self.emit_expr(&expr.args[0], locals)?;
            let left_kind = self.infer_expr_kind(&expr.args[0], locals)?;
            self.emit_compare_to_zero(left_kind, false)?;
            let jump_false = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_expr(&expr.args[1], locals)?;
            let right_kind = self.infer_expr_kind(&expr.args[1], locals)?;
            self.emit_compare_to_zero(right_kind, false)?;
            let jump_end = self.emit_placeholder(IrOpcode::Jump);
            let false_index = self.here();
            self.patch_jump(jump_false, false_index);
            self.emit(IrOpcode::PushI32, 0);
            let end = self.here();
            self.patch_jump(jump_end, end);
            return Ok(());
        }
        if name == "or" {
            if expr.args.len() != 2 {
                return Err(LowerError::TwoArguments(name));
            }
            self.emit_expr(&expr.args[0], locals)?;
            let left_kind = self.infer_expr_kind(&expr.args[0], locals)?;
            self.emit_compare_to_zero(left_kind, false)?;
            let jump_eval = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit(IrOpcode::PushI32, 1);
            let jump_end = self.emit_placeholder(IrOpcode::Jump);
            let eval_index = self.here();
            self.patch_jump(jump_eval, eval_index);
            self.emit_expr(&expr.args[1], locals)?;
            let right_kind = self.infer_expr_kind(&expr.args[1], locals)?;
            self.emit_compare_to_zero(right_kind, false)?;
            let end = self.here();
            self.patch_jump(jump_end, end);
            return Ok(());
        }
        if expr.args.len() != 2 {
            return Err(LowerError::TwoArguments(name));
        }
        self.emit_expr(&expr.args[0], locals)?;
        self.emit_expr(&expr.args[1], locals)?;
        let kind = comparison_kind(
            self.infer_expr_kind(&expr.args[0], locals)?,
            self.infer_expr_kind(&expr.args[1], locals)?,
        );
        if kind == ValueKind::Unknown {
            return Err(LowerError::OperandTypes(name));
        }
        let unsigned = kind == ValueKind::UInt64;
        let wide = kind.is_wide();
        let op = match name.as_str() {
            "equal" => {
                if wide {
                    IrOpcode::CmpEqI64
                } else {
                    IrOpcode::CmpEqI32
                }
            }
            "not_equal" => {
                if wide {
                    IrOpcode::CmpNeI64
                } else {
                    IrOpcode::CmpNeI32
                }
            }
            "less_than" => {
                if unsigned {
                    IrOpcode::CmpLtU64
                } else if wide {
                    IrOpcode::CmpLtI64
                } else {
                    IrOpcode::CmpLtI32
                }
            }
            "less_equal" => {
                if unsigned {
                    IrOpcode::CmpLeU64
                } else if wide {
                    IrOpcode::CmpLeI64
                } else {
                    IrOpcode::CmpLeI32
                }
            }
            "greater_than" => {
                if unsigned {
                    IrOpcode::CmpGtU64
                } else if wide {
                    IrOpcode::CmpGtI64
                } else {
                    IrOpcode::CmpGtI32
                }
            }
            _ => {
                if unsigned {
                    IrOpcode::CmpGeU64
                } else if wide {
                    IrOpcode::CmpGeI64
                } else {
                    IrOpcode::CmpGeI32
                }
            }
        };
        self.emit(op, 0);
        Ok(())
    }

    fn emit_clamp(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        if expr.args.len() != 3 {
            return Err(LowerError::ThreeArguments("clamp".to_string()));
        }
        let mut saw_unsigned = false;
        let mut saw_signed = false;
        for arg in &expr.args {
            let kind = self.infer_expr_kind(arg, locals)?;
            if let ExprKind::Literal { unsigned: true, .. } = arg.kind {
                saw_unsigned = true;
            }
            match kind {
                ValueKind::UInt64 => saw_unsigned = true,
                ValueKind::Int32 | ValueKind::Int64 => saw_signed = true,
                _ => {}
            }
        }
        if saw_unsigned && saw_signed {
            return Err(LowerError::ClampArguments);
        }
        let clamp_kind = combine_numeric_kinds(
            combine_numeric_kinds(
                self.infer_expr_kind(&expr.args[0], locals)?,
                self.infer_expr_kind(&expr.args[1], locals)?,
            ),
            self.infer_expr_kind(&expr.args[2], locals)?,
        );
        if clamp_kind == ValueKind::Unknown {
            return Err(LowerError::ClampArguments);
        }
        let (cmp_lt, cmp_gt) = match clamp_kind {
            ValueKind::UInt64 => (IrOpcode::CmpLtU64, IrOpcode::CmpGtU64),
            ValueKind::Int64 => (IrOpcode::CmpLtI64, IrOpcode::CmpGtI64),
            _ => (IrOpcode::CmpLtI32, IrOpcode::CmpGtI32),
        };

        let temp_value = self.alloc_temp_local();
        let temp_min = self.alloc_temp_local();
        let temp_max = self.alloc_temp_local();
        let temp_out = self.alloc_temp_local();
        self.emit_expr(&expr.args[0], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(temp_value));
        self.emit_expr(&expr.args[1], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(temp_min));
        self.emit_expr(&expr.args[2], locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(temp_max));

        self.emit(IrOpcode::LoadLocal, u64::from(temp_value));
        self.emit(IrOpcode::LoadLocal, u64::from(temp_min));
        self.emit(cmp_lt, 0);
        let skip_min = self.emit_placeholder(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(temp_min));
        self.emit(IrOpcode::StoreLocal, u64::from(temp_out));
        let jump_end_min = self.emit_placeholder(IrOpcode::Jump);
        let check_max = self.here();
        self.patch_jump(skip_min, check_max);

        self.emit(IrOpcode::LoadLocal, u64::from(temp_value));
        self.emit(IrOpcode::LoadLocal, u64::from(temp_max));
        self.emit(cmp_gt, 0);
        let skip_max = self.emit_placeholder(IrOpcode::JumpIfZero);
        self.emit(IrOpcode::LoadLocal, u64::from(temp_max));
        self.emit(IrOpcode::StoreLocal, u64::from(temp_out));
        let jump_end_max = self.emit_placeholder(IrOpcode::Jump);
        let use_value = self.here();
        self.patch_jump(skip_max, use_value);
        self.emit(IrOpcode::LoadLocal, u64::from(temp_value));
        self.emit(IrOpcode::StoreLocal, u64::from(temp_out));
        let end = self.here();
        self.patch_jump(jump_end_min, end);
        self.patch_jump(jump_end_max, end);
        self.emit(IrOpcode::LoadLocal, u64::from(temp_out));
        Ok(())
    }

    fn emit_convert(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        if expr.template_args.len() != 1 {
            return Err(LowerError::ConvertTemplateArg);
        }
        if expr.args.len() != 1 {
            return Err(LowerError::OneArgument("convert".to_string()));
        }
        let type_name = expr.template_args[0].as_str();
        if !matches!(type_name, "int" | "i32" | "i64" | "u64" | "bool") {
            return Err(LowerError::ConvertTarget);
        }
        self.emit_expr(&expr.args[0], locals)?;
        if type_name == "bool" {
            let kind = self.infer_expr_kind(&expr.args[0], locals)?;
            self.emit_compare_to_zero(kind, false)?;
        }
        Ok(())
    }

    fn emit_pointer_builtin(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
        name: String,
    ) -> Result<(), LowerError> {
        if expr.args.len() != 1 {
            return Err(LowerError::OneArgument(name));
        }
        if name == "location" {
            let target = &expr.args[0];
            if target.kind != ExprKind::Name {
                return Err(LowerError::LocationTarget);
            }
            let info = locals
                .get(&target.name)
                .ok_or(LowerError::LocationTarget)?;
            if info.kind == BindingKind::Reference {
                // The stored address itself, no extra address-of.
                self.emit(IrOpcode::LoadLocal, u64::from(info.index));
            } else {
                self.emit(IrOpcode::AddressOfLocal, u64::from(info.index));
            }
            return Ok(());
        }
        let pointer_expr = &expr.args[0];
        if pointer_expr.kind == ExprKind::Name {
            let info = locals
                .get(&pointer_expr.name)
                .ok_or_else(|| LowerError::UnknownIdentifier(pointer_expr.name.clone()))?;
            if !matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) {
                return Err(LowerError::DereferenceTarget);
            }
            self.emit(IrOpcode::LoadLocal, u64::from(info.index));
        } else {
            self.emit_expr(pointer_expr, locals)?;
        }
        self.emit(IrOpcode::LoadIndirect, 0);
        Ok(())
    }

    fn emit_array_literal(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        if expr.template_args.len() != 1 {
            return Err(LowerError::ArrayTemplateArg);
        }
        let elem_kind = ValueKind::from_type_name(&expr.template_args[0]);
        if elem_kind == ValueKind::Unknown || elem_kind == ValueKind::String {
            return Err(LowerError::ArrayLiteralKind);
        }
        let count = i32::try_from(expr.args.len()).map_err(|_| LowerError::ArrayTooLarge)?;

        // Count-prefixed layout: the count at the base slot, element i at
        // base + 1 + i. The literal's value is the base address.
        let base_local = self.next_local;
        self.next_local += 1 + expr.args.len() as u32;

        self.emit(IrOpcode::PushI32, count as u32 as u64);
        self.emit(IrOpcode::StoreLocal, u64::from(base_local));

        for (i, arg) in expr.args.iter().enumerate() {
            let arg_kind = self.infer_expr_kind(arg, locals)?;
            if arg_kind == ValueKind::Unknown || arg_kind == ValueKind::String {
                return Err(LowerError::ArrayElementValue);
            }
            if arg_kind != elem_kind {
                return Err(LowerError::ArrayElementMismatch);
            }
            self.emit_expr(arg, locals)?;
            self.emit(IrOpcode::StoreLocal, u64::from(base_local + 1 + i as u32));
        }

        self.emit(IrOpcode::AddressOfLocal, u64::from(base_local));
        Ok(())
    }

    fn emit_assign(&mut self, expr: &Expr, locals: &LocalMap) -> Result<(), LowerError> {
        if expr.args.len() != 2 {
            return Err(LowerError::TwoArguments("assign".to_string()));
        }
        let target = &expr.args[0];
        if target.kind == ExprKind::Name {
            let info = locals
                .get(&target.name)
                .ok_or_else(|| LowerError::AssignTargetUnknown(target.name.clone()))?
                .clone();
            if !info.mutable {
                return Err(LowerError::AssignTargetNotMutable(target.name.clone()));
            }
            if info.kind == BindingKind::Reference {
                self.emit(IrOpcode::LoadLocal, u64::from(info.index));
                self.emit_expr(&expr.args[1], locals)?;
                self.emit(IrOpcode::StoreIndirect, 0);
                return Ok(());
            }
            self.emit_expr(&expr.args[1], locals)?;
            self.emit(IrOpcode::Dup, 0);
            self.emit(IrOpcode::StoreLocal, u64::from(info.index));
            return Ok(());
        }
        if target.kind == ExprKind::Call && builtins::is_simple_call(target, "dereference") {
            if target.args.len() != 1 {
                return Err(LowerError::OneArgument("dereference".to_string()));
            }
            let pointer_expr = &target.args[0];
            if pointer_expr.kind == ExprKind::Name {
                let info = locals
                    .get(&pointer_expr.name)
                    .ok_or(LowerError::AssignDerefNotMutable)?;
                if !info.mutable {
                    return Err(LowerError::AssignDerefNotMutable);
                }
                if !matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) {
                    return Err(LowerError::AssignDerefNotPointer);
                }
                self.emit(IrOpcode::LoadLocal, u64::from(info.index));
            } else {
                self.emit_expr(pointer_expr, locals)?;
            }
            self.emit_expr(&expr.args[1], locals)?;
            self.emit(IrOpcode::StoreIndirect, 0);
            return Ok(());
        }
        Err(LowerError::AssignTargetShape)
    }
}
