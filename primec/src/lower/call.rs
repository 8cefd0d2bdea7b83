//! Named-argument ordering and user-call inlining.
//!
//! User calls never survive into the IR: the callee body is expanded at the
//! call site with per-invocation fresh locals, a pre-zeroed return local,
//! and `return` sites rewritten into jumps past the body.

use crate::ast::{Definition, Expr, ExprKind};
use crate::ir::IrOpcode;

use super::builtins;
use super::types::{
    binding_kind, binding_value_kind, is_binding_mutable, is_float_binding, is_string_binding,
    BindingKind, LocalInfo, StringSource, ValueKind,
};
use super::{InlineContext, LocalMap, LowerError, Lowerer};

impl<'p> Lowerer<'p> {
    /// Order a call's arguments against the callee's parameter list.
    ///
    /// Positional arguments before the first named argument bind
    /// left-to-right; named arguments bind their parameter; parameters left
    /// unbound fall back to their declared default expression.
    pub(super) fn build_ordered_call_arguments<'a>(
        &self,
        call: &'a Expr,
        callee: &'a Definition,
    ) -> Result<Vec<&'a Expr>, LowerError> {
        let mut ordered: Vec<Option<&Expr>> = vec![None; callee.parameters.len()];
        let mut positional = 0usize;
        for (i, arg) in call.args.iter().enumerate() {
            if let Some(Some(name)) = call.arg_names.get(i) {
                let index = callee
                    .parameters
                    .iter()
                    .position(|param| &param.name == name)
                    .ok_or_else(|| LowerError::UnknownNamedArgument(name.clone()))?;
                if ordered[index].is_some() {
                    return Err(LowerError::DuplicateNamedArgument(name.clone()));
                }
                ordered[index] = Some(arg);
                continue;
            }
            while positional < ordered.len() && ordered[positional].is_some() {
                positional += 1;
            }
            if positional >= ordered.len() {
                return Err(LowerError::ArgumentCountMismatch);
            }
            ordered[positional] = Some(arg);
            positional += 1;
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Some(arg) => Ok(arg),
                None => callee.parameters[i]
                    .args
                    .first()
                    .ok_or(LowerError::ArgumentCountMismatch),
            })
            .collect()
    }

    /// Materialize a string argument for an inlined call: push the integer
    /// value the local holds and report where its bytes come from.
    pub(super) fn emit_string_value_for_call(
        &mut self,
        arg: &Expr,
        caller_locals: &LocalMap,
    ) -> Result<StringSource, LowerError> {
        match &arg.kind {
            ExprKind::StringLiteral(text) => {
                let index = self.intern_string(text);
                self.emit(IrOpcode::PushI64, u64::from(index));
                Ok(StringSource::Table(index))
            }
            ExprKind::Name => {
                let info = caller_locals
                    .get(&arg.name)
                    .ok_or_else(|| LowerError::UnknownIdentifier(arg.name.clone()))?;
                if info.value_kind != ValueKind::String || info.string_source.is_none() {
                    return Err(LowerError::StringArgumentSource);
                }
                let source = info.string_source.ok_or(LowerError::StringArgumentSource)?;
                self.emit(IrOpcode::LoadLocal, u64::from(info.index));
                Ok(source)
            }
            ExprKind::Call => {
                let access = builtins::array_access_name(arg)
                    .ok_or(LowerError::StringArgumentSource)?
                    .to_string();
                if arg.args.len() != 2 {
                    return Err(LowerError::TwoArguments(access));
                }
                if !self.is_entry_args_name(&arg.args[0], caller_locals) {
                    return Err(LowerError::EntryArgsIndexing);
                }
                let index_local =
                    self.emit_argv_index(&arg.args[1], caller_locals, &access)?;
                self.emit(IrOpcode::LoadLocal, u64::from(index_local));
                Ok(StringSource::Argv)
            }
            _ => Err(LowerError::StringArgumentSource),
        }
    }

    /// Evaluate an argv index expression into a fresh local, emitting the
    /// bounds-check branches for `at`. Returns the index local.
    pub(super) fn emit_argv_index(
        &mut self,
        index_expr: &Expr,
        locals: &LocalMap,
        access: &str,
    ) -> Result<u32, LowerError> {
        let mut index_kind = self.infer_expr_kind(index_expr, locals)?;
        if index_kind == ValueKind::Bool {
            index_kind = ValueKind::Int32;
        }
        if index_kind != ValueKind::Int32 {
            return Err(LowerError::IndexKind(access.to_string()));
        }

        let index_local = self.alloc_temp_local();
        self.emit_expr(index_expr, locals)?;
        self.emit(IrOpcode::StoreLocal, u64::from(index_local));

        if access == "at" {
            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::PushI32, 0);
            self.emit(IrOpcode::CmpLtI32, 0);
            let non_negative = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(non_negative, target);

            self.emit(IrOpcode::LoadLocal, u64::from(index_local));
            self.emit(IrOpcode::PushArgc, 0);
            self.emit(IrOpcode::CmpGeI32, 0);
            let in_range = self.emit_placeholder(IrOpcode::JumpIfZero);
            self.emit_array_index_out_of_bounds();
            let target = self.here();
            self.patch_jump(in_range, target);
        }
        Ok(index_local)
    }

    /// Inline `callee` at the current emission point. In value context the
    /// callee's return local is left on the stack.
    pub(super) fn emit_inline_definition_call(
        &mut self,
        call: &Expr,
        callee: &'p Definition,
        caller_locals: &LocalMap,
        require_value: bool,
    ) -> Result<(), LowerError> {
        let return_info = self.return_info(&callee.full_path)?;
        if return_info.returns_void && require_value {
            return Err(LowerError::VoidCallInExpression(callee.full_path.clone()));
        }
        if !self.inline_stack.insert(callee.full_path.clone()) {
            return Err(LowerError::RecursiveCall(callee.full_path.clone()));
        }

        let ordered_args = self.build_ordered_call_arguments(call, callee)?;

        let mut callee_locals = LocalMap::new();
        for (param, arg) in callee.parameters.iter().zip(&ordered_args) {
            if is_float_binding(param) {
                return Err(LowerError::FloatUnsupported);
            }
            let index = self.alloc_temp_local();
            let mut info = LocalInfo {
                index,
                mutable: is_binding_mutable(param),
                kind: binding_kind(param),
                value_kind: binding_value_kind(param),
                string_source: None,
            };

            if is_string_binding(param) {
                if info.kind != BindingKind::Value {
                    return Err(LowerError::StringPointer);
                }
                let source = self.emit_string_value_for_call(arg, caller_locals)?;
                info.value_kind = ValueKind::String;
                info.string_source = Some(source);
            } else {
                if !info.value_kind.is_numeric_or_bool() {
                    return Err(LowerError::ParameterKind);
                }
                self.emit_expr(arg, caller_locals)?;
            }
            callee_locals.insert(param.name.clone(), info);
            self.emit(IrOpcode::StoreLocal, u64::from(index));
        }

        let return_local = if return_info.returns_void {
            None
        } else {
            let local = self.alloc_temp_local();
            if return_info.kind.is_wide() {
                self.emit(IrOpcode::PushI64, 0);
            } else {
                self.emit(IrOpcode::PushI32, 0);
            }
            self.emit(IrOpcode::StoreLocal, u64::from(local));
            Some(local)
        };

        self.inline_contexts.push(InlineContext {
            returns_void: return_info.returns_void,
            return_local,
            return_jumps: Vec::new(),
        });
        for stmt in &callee.statements {
            self.emit_statement(stmt, &mut callee_locals)?;
        }
        let end = self.here();
        if let Some(context) = self.inline_contexts.pop() {
            for jump in context.return_jumps {
                self.patch_jump(jump, end);
            }
        }

        if let Some(local) = return_local {
            self.emit(IrOpcode::LoadLocal, u64::from(local));
        }

        self.inline_stack.remove(&callee.full_path);
        Ok(())
    }
}
