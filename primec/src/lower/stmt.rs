//! Statement lowering: bindings, return, if, repeat, the print family, and
//! expression statements.
//!
//! Blocks (`then`/`else` bodies, `repeat` bodies) lower against a copy of
//! the local map so their bindings stay scoped; the instruction stream is
//! shared throughout.

use crate::ast::{Expr, ExprKind};
use crate::ir::{encode_print_flags, encode_print_string_imm, IrOpcode};

use super::builtins::{self, PrintBuiltin, PrintTarget};
use super::types::{
    binding_kind, binding_value_kind, is_binding_mutable, is_float_binding, is_string_binding,
    BindingKind, LocalInfo, StringSource, ValueKind,
};
use super::{LocalMap, LowerError, Lowerer};

impl<'p> Lowerer<'p> {
    pub(super) fn emit_statement(
        &mut self,
        stmt: &Expr,
        locals: &mut LocalMap,
    ) -> Result<(), LowerError> {
        if stmt.is_binding {
            return self.emit_binding(stmt, locals);
        }
        if stmt.kind == ExprKind::Call {
            if let Some(print) = builtins::print_builtin(stmt) {
                if !stmt.body_arguments.is_empty() {
                    return Err(LowerError::PrintBodyArguments(print.name.to_string()));
                }
                if stmt.args.len() != 1 {
                    return Err(LowerError::OneArgument(print.name.to_string()));
                }
                return self.emit_print_arg(&stmt.args[0], locals, print);
            }
        }
        if builtins::is_return_call(stmt) {
            return self.emit_return(stmt, locals);
        }
        if builtins::is_if_call(stmt) {
            return self.emit_if(stmt, locals);
        }
        if builtins::is_repeat_call(stmt) {
            return self.emit_repeat(stmt, locals);
        }
        if stmt.kind == ExprKind::Call {
            if let Some(callee) = self.resolve_definition_call(stmt) {
                if !stmt.body_arguments.is_empty() {
                    return Err(LowerError::CallBlockArguments);
                }
                let info = self.return_info(&callee.full_path)?;
                self.emit_inline_definition_call(stmt, callee, locals, false)?;
                if !info.returns_void {
                    self.emit(IrOpcode::Pop, 0);
                }
                return Ok(());
            }
        }
        self.emit_expr(stmt, locals)?;
        self.emit(IrOpcode::Pop, 0);
        Ok(())
    }

    fn emit_binding(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), LowerError> {
        if stmt.args.len() != 1 {
            return Err(LowerError::OneArgument("binding".to_string()));
        }
        if locals.contains_key(&stmt.name) {
            return Err(LowerError::BindingRedefinesName(stmt.name.clone()));
        }
        if is_float_binding(stmt) {
            return Err(LowerError::FloatUnsupported);
        }
        if is_string_binding(stmt) {
            return self.emit_string_binding(stmt, locals);
        }

        self.emit_expr(&stmt.args[0], locals)?;
        let info = LocalInfo {
            index: self.alloc_temp_local(),
            mutable: is_binding_mutable(stmt),
            kind: binding_kind(stmt),
            value_kind: binding_value_kind(stmt),
            string_source: None,
        };
        if info.kind == BindingKind::Reference {
            let init = &stmt.args[0];
            let is_location = init.kind == ExprKind::Call
                && builtins::is_simple_call(init, "location")
                && init.args.len() == 1;
            if !is_location {
                return Err(LowerError::ReferenceInitializer);
            }
        }
        let index = info.index;
        locals.insert(stmt.name.clone(), info);
        self.emit(IrOpcode::StoreLocal, u64::from(index));
        Ok(())
    }

    fn emit_string_binding(
        &mut self,
        stmt: &Expr,
        locals: &mut LocalMap,
    ) -> Result<(), LowerError> {
        if binding_kind(stmt) != BindingKind::Value {
            return Err(LowerError::StringPointer);
        }
        let init = &stmt.args[0];
        let source;
        let mut literal_index = None;
        match &init.kind {
            ExprKind::StringLiteral(text) => {
                let index = self.intern_string(text);
                literal_index = Some(index);
                source = StringSource::Table(index);
            }
            ExprKind::Name => {
                let info = locals
                    .get(&init.name)
                    .ok_or_else(|| LowerError::UnknownIdentifier(init.name.clone()))?;
                if info.value_kind != ValueKind::String || info.string_source.is_none() {
                    return Err(LowerError::StringBindingInitializer);
                }
                source = info
                    .string_source
                    .ok_or(LowerError::StringBindingInitializer)?;
                let index = info.index;
                self.emit(IrOpcode::LoadLocal, u64::from(index));
            }
            ExprKind::Call => {
                let access = builtins::array_access_name(init)
                    .ok_or(LowerError::StringBindingInitializer)?
                    .to_string();
                if init.args.len() != 2 {
                    return Err(LowerError::TwoArguments(access));
                }
                if !self.is_entry_args_name(&init.args[0], locals) {
                    return Err(LowerError::EntryArgsIndexing);
                }
                let index_local = self.emit_argv_index(&init.args[1], locals, &access)?;
                self.emit(IrOpcode::LoadLocal, u64::from(index_local));
                source = StringSource::Argv;
            }
            _ => return Err(LowerError::StringBindingInitializer),
        }

        let info = LocalInfo {
            index: self.alloc_temp_local(),
            mutable: is_binding_mutable(stmt),
            kind: BindingKind::Value,
            value_kind: ValueKind::String,
            string_source: Some(source),
        };
        if let Some(index) = literal_index {
            self.emit(IrOpcode::PushI64, u64::from(index));
        }
        let index = info.index;
        locals.insert(stmt.name.clone(), info);
        self.emit(IrOpcode::StoreLocal, u64::from(index));
        Ok(())
    }

    fn emit_print_arg(
        &mut self,
        arg: &Expr,
        locals: &LocalMap,
        print: PrintBuiltin,
    ) -> Result<(), LowerError> {
        let flags = encode_print_flags(print.newline, print.target == PrintTarget::Err);
        if arg.kind == ExprKind::Call {
            if let Some(access) = builtins::array_access_name(arg) {
                let access = access.to_string();
                if arg.args.len() != 2 {
                    return Err(LowerError::TwoArguments(access));
                }
                if self.is_entry_args_name(&arg.args[0], locals) {
                    let index_local = self.emit_argv_index(&arg.args[1], locals, &access)?;
                    self.emit(IrOpcode::LoadLocal, u64::from(index_local));
                    let op = if access == "at" {
                        IrOpcode::PrintArgv
                    } else {
                        IrOpcode::PrintArgvUnsafe
                    };
                    self.emit(op, flags);
                    return Ok(());
                }
            }
        }
        if let ExprKind::StringLiteral(text) = &arg.kind {
            let index = self.intern_string(text);
            self.emit(IrOpcode::PrintString, encode_print_string_imm(index, flags));
            return Ok(());
        }
        if arg.kind == ExprKind::Name {
            let info = locals
                .get(&arg.name)
                .ok_or_else(|| LowerError::UnknownIdentifier(arg.name.clone()))?;
            if info.value_kind == ValueKind::String {
                match info.string_source {
                    Some(StringSource::Table(index)) => {
                        self.emit(IrOpcode::PrintString, encode_print_string_imm(index, flags));
                        return Ok(());
                    }
                    Some(StringSource::Argv) => {
                        self.emit(IrOpcode::LoadLocal, u64::from(info.index));
                        self.emit(IrOpcode::PrintArgv, flags);
                        return Ok(());
                    }
                    None => {}
                }
            }
        }
        self.emit_expr(arg, locals)?;
        match self.infer_expr_kind(arg, locals)? {
            ValueKind::Int64 => self.emit(IrOpcode::PrintI64, flags),
            ValueKind::UInt64 => self.emit(IrOpcode::PrintU64, flags),
            ValueKind::Int32 | ValueKind::Bool => self.emit(IrOpcode::PrintI32, flags),
            _ => return Err(LowerError::PrintArgument(print.name.to_string())),
        }
        Ok(())
    }

    fn emit_return(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), LowerError> {
        if let Some(context) = self.inline_contexts.last() {
            let returns_void = context.returns_void;
            let return_local = context.return_local;
            if stmt.args.is_empty() {
                if !returns_void {
                    return Err(LowerError::OneArgument("return".to_string()));
                }
                let jump = self.emit_placeholder(IrOpcode::Jump);
                if let Some(context) = self.inline_contexts.last_mut() {
                    context.return_jumps.push(jump);
                }
                return Ok(());
            }
            if stmt.args.len() != 1 {
                return Err(LowerError::OneArgument("return".to_string()));
            }
            if returns_void {
                return Err(LowerError::ReturnValueInVoid);
            }
            let Some(return_local) = return_local else {
                return Err(LowerError::ReturnValueKind);
            };
            self.emit_expr(&stmt.args[0], locals)?;
            let kind = self.infer_expr_kind(&stmt.args[0], locals)?;
            if !kind.is_numeric_or_bool() {
                return Err(LowerError::ReturnValueKind);
            }
            self.emit(IrOpcode::StoreLocal, u64::from(return_local));
            let jump = self.emit_placeholder(IrOpcode::Jump);
            if let Some(context) = self.inline_contexts.last_mut() {
                context.return_jumps.push(jump);
            }
            return Ok(());
        }

        if stmt.args.is_empty() {
            if !self.entry_returns_void {
                return Err(LowerError::OneArgument("return".to_string()));
            }
            self.emit(IrOpcode::ReturnVoid, 0);
            self.saw_return = true;
            return Ok(());
        }
        if stmt.args.len() != 1 {
            return Err(LowerError::OneArgument("return".to_string()));
        }
        if self.entry_returns_void {
            return Err(LowerError::ReturnValueInVoid);
        }
        self.emit_expr(&stmt.args[0], locals)?;
        match self.infer_expr_kind(&stmt.args[0], locals)? {
            ValueKind::Int64 | ValueKind::UInt64 => self.emit(IrOpcode::ReturnI64, 0),
            ValueKind::Int32 | ValueKind::Bool => self.emit(IrOpcode::ReturnI32, 0),
            _ => return Err(LowerError::ReturnValueKind),
        }
        self.saw_return = true;
        Ok(())
    }

    fn emit_if(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), LowerError> {
        if stmt.args.len() != 3 {
            return Err(LowerError::IfShape);
        }
        if !stmt.body_arguments.is_empty() {
            return Err(LowerError::IfTrailingBlock);
        }
        self.emit_expr(&stmt.args[0], locals)?;
        let then_block = &stmt.args[1];
        let else_block = &stmt.args[2];
        if !builtins::is_then_call(then_block) || !builtins::is_else_call(else_block) {
            return Err(LowerError::IfBlocks);
        }
        let jump_if_zero = self.emit_placeholder(IrOpcode::JumpIfZero);
        let mut then_locals = locals.clone();
        self.emit_block(then_block, &mut then_locals)?;
        let jump_end = self.emit_placeholder(IrOpcode::Jump);
        let else_index = self.here();
        self.patch_jump(jump_if_zero, else_index);
        let mut else_locals = locals.clone();
        self.emit_block(else_block, &mut else_locals)?;
        let end = self.here();
        self.patch_jump(jump_end, end);
        Ok(())
    }

    fn emit_block(&mut self, block: &Expr, locals: &mut LocalMap) -> Result<(), LowerError> {
        if block.kind != ExprKind::Call {
            return Err(LowerError::BlockShape);
        }
        if !block.args.is_empty() {
            return Err(LowerError::BlockArguments);
        }
        for stmt in &block.body_arguments {
            self.emit_statement(stmt, locals)?;
        }
        Ok(())
    }

    fn emit_repeat(&mut self, stmt: &Expr, locals: &mut LocalMap) -> Result<(), LowerError> {
        if stmt.args.len() != 1 {
            return Err(LowerError::OneArgument("repeat".to_string()));
        }
        self.emit_expr(&stmt.args[0], locals)?;
        let mut count_kind = self.infer_expr_kind(&stmt.args[0], locals)?;
        if count_kind == ValueKind::Bool {
            count_kind = ValueKind::Int32;
        }
        if !matches!(
            count_kind,
            ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64
        ) {
            return Err(LowerError::RepeatCount);
        }

        let counter = self.alloc_temp_local();
        self.emit(IrOpcode::StoreLocal, u64::from(counter));

        let check_index = self.here();
        self.emit(IrOpcode::LoadLocal, u64::from(counter));
        match count_kind {
            ValueKind::Int32 => {
                self.emit(IrOpcode::PushI32, 0);
                self.emit(IrOpcode::CmpGtI32, 0);
            }
            ValueKind::Int64 => {
                self.emit(IrOpcode::PushI64, 0);
                self.emit(IrOpcode::CmpGtI64, 0);
            }
            _ => {
                self.emit(IrOpcode::PushI64, 0);
                self.emit(IrOpcode::CmpNeI64, 0);
            }
        }
        let jump_end = self.emit_placeholder(IrOpcode::JumpIfZero);

        let mut body_locals = locals.clone();
        for body_stmt in &stmt.body_arguments {
            self.emit_statement(body_stmt, &mut body_locals)?;
        }

        self.emit(IrOpcode::LoadLocal, u64::from(counter));
        if count_kind == ValueKind::Int32 {
            self.emit(IrOpcode::PushI32, 1);
            self.emit(IrOpcode::SubI32, 0);
        } else {
            self.emit(IrOpcode::PushI64, 1);
            self.emit(IrOpcode::SubI64, 0);
        }
        self.emit(IrOpcode::StoreLocal, u64::from(counter));
        self.emit(IrOpcode::Jump, check_index as u64);

        let end = self.here();
        self.patch_jump(jump_end, end);
        Ok(())
    }
}
