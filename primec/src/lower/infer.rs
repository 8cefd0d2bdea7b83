//! Return-type and expression-kind inference.
//!
//! Inference walks the AST without emitting code. Definitions without a
//! `return<T>` annotation get a single return kind by unifying every
//! `return(expr)` site; an explicit in-progress set turns re-entrant walks
//! (mutual recursion) into a demand for an annotation instead of looping.

use crate::ast::{Definition, Expr, ExprKind};

use super::builtins;
use super::expr::is_pointer_operand;
use super::types::{
    binding_kind, binding_value_kind, combine_numeric_kinds, is_binding_mutable, is_float_binding,
    is_string_binding, BindingKind, LocalInfo, StringSource, ValueKind,
};
use super::{LocalMap, LowerError, Lowerer};

/// Cached result of return-type resolution for one definition.
#[derive(Debug, Clone, Copy)]
pub(super) struct ReturnInfo {
    pub returns_void: bool,
    pub kind: ValueKind,
}

/// Accumulator for the statement walk of one definition body.
struct InferAcc {
    inferred: ValueKind,
    saw_return: bool,
    inferred_void: bool,
}

fn is_struct_marker(name: &str) -> bool {
    matches!(
        name,
        "struct" | "pod" | "stack" | "heap" | "buffer" | "handle" | "gpu_lane"
    )
}

impl<'p> Lowerer<'p> {
    /// Resolve the return kind of the definition at `path`, caching the
    /// result. Re-entering a definition already being inferred is an error.
    pub(super) fn return_info(&mut self, path: &str) -> Result<ReturnInfo, LowerError> {
        if let Some(info) = self.return_cache.get(path) {
            return Ok(*info);
        }
        let def = *self
            .defs
            .get(path)
            .ok_or_else(|| LowerError::UnresolvedDefinition(path.to_string()))?;
        if !self.inference_stack.insert(path.to_string()) {
            return Err(LowerError::RecursiveInference(path.to_string()));
        }
        let info = self.infer_definition_return(def)?;
        self.inference_stack.remove(path);
        self.return_cache.insert(path.to_string(), info);
        Ok(info)
    }

    fn infer_definition_return(&mut self, def: &'p Definition) -> Result<ReturnInfo, LowerError> {
        let mut info = ReturnInfo {
            returns_void: false,
            kind: ValueKind::Unknown,
        };
        let mut has_return_transform = false;
        for transform in &def.transforms {
            if is_struct_marker(&transform.name) {
                info.returns_void = true;
                has_return_transform = true;
                break;
            }
            if transform.name != "return" {
                continue;
            }
            has_return_transform = true;
            let Some(arg) = &transform.template_arg else {
                continue;
            };
            if arg == "void" {
                info.returns_void = true;
            } else {
                info.kind = ValueKind::from_type_name(arg);
                info.returns_void = false;
            }
            break;
        }

        if has_return_transform {
            if !info.returns_void {
                if info.kind == ValueKind::Unknown {
                    return Err(LowerError::UnsupportedReturnType(def.full_path.clone()));
                }
                if info.kind == ValueKind::String {
                    return Err(LowerError::StringReturn(def.full_path.clone()));
                }
            }
            return Ok(info);
        }

        if !def.has_return_statement {
            info.returns_void = true;
            return Ok(info);
        }

        let mut locals = LocalMap::new();
        for param in &def.parameters {
            if is_float_binding(param) {
                return Err(LowerError::FloatUnsupported);
            }
            let kind = binding_kind(param);
            let value_kind = binding_value_kind(param);
            if is_string_binding(param) && kind != BindingKind::Value {
                return Err(LowerError::StringPointer);
            }
            if value_kind == ValueKind::Unknown {
                return Err(LowerError::UntypedParameter(def.full_path.clone()));
            }
            locals.insert(
                param.name.clone(),
                LocalInfo {
                    index: 0,
                    mutable: is_binding_mutable(param),
                    kind,
                    value_kind,
                    string_source: None,
                },
            );
        }

        let mut acc = InferAcc {
            inferred: ValueKind::Unknown,
            saw_return: false,
            inferred_void: false,
        };
        for stmt in &def.statements {
            self.infer_stmt(def, stmt, &mut locals, &mut acc)?;
        }

        if !acc.saw_return || acc.inferred_void {
            if acc.saw_return && acc.inferred != ValueKind::Unknown {
                return Err(LowerError::ConflictingReturnTypes(def.full_path.clone()));
            }
            info.returns_void = true;
        } else {
            info.returns_void = false;
            info.kind = acc.inferred;
            if info.kind == ValueKind::Unknown {
                return Err(LowerError::CannotInferReturn(def.full_path.clone()));
            }
        }
        Ok(info)
    }

    fn infer_stmt(
        &mut self,
        def: &Definition,
        stmt: &Expr,
        locals: &mut LocalMap,
        acc: &mut InferAcc,
    ) -> Result<(), LowerError> {
        if stmt.is_binding {
            if is_float_binding(stmt) {
                return Err(LowerError::FloatUnsupported);
            }
            let kind = binding_kind(stmt);
            let value_kind = binding_value_kind(stmt);
            if is_string_binding(stmt) && kind != BindingKind::Value {
                return Err(LowerError::StringPointer);
            }
            if value_kind == ValueKind::Unknown {
                return Err(LowerError::UntypedBinding(def.full_path.clone()));
            }
            locals.insert(
                stmt.name.clone(),
                LocalInfo {
                    index: 0,
                    mutable: is_binding_mutable(stmt),
                    kind,
                    value_kind,
                    string_source: None,
                },
            );
            return Ok(());
        }
        if builtins::is_return_call(stmt) {
            acc.saw_return = true;
            if stmt.args.is_empty() {
                acc.inferred_void = true;
                return Ok(());
            }
            let kind = self.infer_expr_kind(&stmt.args[0], locals)?;
            if kind == ValueKind::Unknown {
                return Err(LowerError::CannotInferReturn(def.full_path.clone()));
            }
            if kind == ValueKind::String {
                return Err(LowerError::StringReturn(def.full_path.clone()));
            }
            if acc.inferred == ValueKind::Unknown {
                acc.inferred = kind;
            } else if acc.inferred != kind {
                return Err(LowerError::ConflictingReturnTypes(def.full_path.clone()));
            }
            return Ok(());
        }
        if builtins::is_if_call(stmt) && stmt.args.len() == 3 {
            for block in &stmt.args[1..3] {
                let mut block_locals = locals.clone();
                for body_stmt in &block.body_arguments {
                    self.infer_stmt(def, body_stmt, &mut block_locals, acc)?;
                }
            }
        }
        if builtins::is_repeat_call(stmt) {
            let mut block_locals = locals.clone();
            for body_stmt in &stmt.body_arguments {
                self.infer_stmt(def, body_stmt, &mut block_locals, acc)?;
            }
        }
        Ok(())
    }

    /// Kind of the value `expr` evaluates to, or `Unknown` when the walk
    /// cannot decide (the caller turns that into a context-specific error).
    pub(super) fn infer_expr_kind(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<ValueKind, LowerError> {
        match &expr.kind {
            ExprKind::Literal {
                width, unsigned, ..
            } => {
                if *unsigned {
                    Ok(ValueKind::UInt64)
                } else if *width == 64 {
                    Ok(ValueKind::Int64)
                } else {
                    Ok(ValueKind::Int32)
                }
            }
            ExprKind::BoolLiteral(_) => Ok(ValueKind::Bool),
            ExprKind::Name => {
                let Some(info) = locals.get(&expr.name) else {
                    return Ok(ValueKind::Unknown);
                };
                match info.kind {
                    BindingKind::Value | BindingKind::Reference => {
                        if info.value_kind == ValueKind::String {
                            Ok(ValueKind::Unknown)
                        } else {
                            Ok(info.value_kind)
                        }
                    }
                    _ => Ok(ValueKind::Unknown),
                }
            }
            ExprKind::Call => self.infer_call_kind(expr, locals),
            _ => Ok(ValueKind::Unknown),
        }
    }

    fn infer_call_kind(
        &mut self,
        expr: &Expr,
        locals: &LocalMap,
    ) -> Result<ValueKind, LowerError> {
        if !expr.is_method_call {
            let resolved = expr.resolved_path();
            if self.defs.contains_key(resolved.as_str()) {
                let info = self.return_info(&resolved)?;
                if !info.returns_void {
                    return Ok(info.kind);
                }
                return Ok(ValueKind::Unknown);
            }
        }
        if builtins::is_simple_call(expr, "count") && expr.args.len() == 1 {
            if self.is_entry_args_name(&expr.args[0], locals) {
                return Ok(ValueKind::Int32);
            }
            let target = &expr.args[0];
            if target.kind == ExprKind::Name {
                if let Some(info) = locals.get(&target.name) {
                    if info.kind == BindingKind::Array {
                        return Ok(ValueKind::Int32);
                    }
                }
            }
            if target.kind == ExprKind::Call
                && builtins::collection_name(target) == Some("array")
                && target.template_args.len() == 1
            {
                return Ok(ValueKind::Int32);
            }
        }
        if builtins::array_access_name(expr).is_some() {
            if expr.args.len() != 2 {
                return Ok(ValueKind::Unknown);
            }
            let target = &expr.args[0];
            if self.is_entry_args_name(target, locals) {
                return Ok(ValueKind::Unknown);
            }
            let mut elem_kind = ValueKind::Unknown;
            if target.kind == ExprKind::Name {
                if let Some(info) = locals.get(&target.name) {
                    if info.kind == BindingKind::Array {
                        elem_kind = info.value_kind;
                    } else if info.kind == BindingKind::Value
                        && info.value_kind == ValueKind::String
                        && matches!(info.string_source, Some(StringSource::Table(_)))
                    {
                        // Byte access on an interned string yields the byte.
                        return Ok(ValueKind::Int32);
                    }
                }
            } else if target.kind == ExprKind::Call
                && builtins::collection_name(target) == Some("array")
                && target.template_args.len() == 1
            {
                elem_kind = ValueKind::from_type_name(&target.template_args[0]);
            }
            if elem_kind == ValueKind::Unknown || elem_kind == ValueKind::String {
                return Ok(ValueKind::Unknown);
            }
            return Ok(elem_kind);
        }
        if builtins::comparison_name(expr).is_some() {
            return Ok(ValueKind::Bool);
        }
        if let Some(name) = builtins::operator_name(expr) {
            if name == "negate" {
                if expr.args.len() != 1 {
                    return Ok(ValueKind::Unknown);
                }
                return self.infer_expr_kind(&expr.args[0], locals);
            }
            if expr.args.len() != 2 {
                return Ok(ValueKind::Unknown);
            }
            let left = self.infer_expr_kind(&expr.args[0], locals)?;
            let right = self.infer_expr_kind(&expr.args[1], locals)?;
            return Ok(combine_numeric_kinds(left, right));
        }
        if builtins::is_clamp_call(expr) {
            if expr.args.len() != 3 {
                return Ok(ValueKind::Unknown);
            }
            let first = self.infer_expr_kind(&expr.args[0], locals)?;
            let second = self.infer_expr_kind(&expr.args[1], locals)?;
            let third = self.infer_expr_kind(&expr.args[2], locals)?;
            return Ok(combine_numeric_kinds(
                combine_numeric_kinds(first, second),
                third,
            ));
        }
        if builtins::is_convert_call(expr) {
            if expr.template_args.len() != 1 {
                return Ok(ValueKind::Unknown);
            }
            return Ok(ValueKind::from_type_name(&expr.template_args[0]));
        }
        if builtins::is_simple_call(expr, "assign") {
            if expr.args.len() != 2 {
                return Ok(ValueKind::Unknown);
            }
            let target = &expr.args[0];
            if target.kind == ExprKind::Name {
                let Some(info) = locals.get(&target.name) else {
                    return Ok(ValueKind::Unknown);
                };
                if matches!(info.kind, BindingKind::Value | BindingKind::Reference) {
                    return Ok(info.value_kind);
                }
                return Ok(ValueKind::Unknown);
            }
            if target.kind == ExprKind::Call
                && builtins::is_simple_call(target, "dereference")
                && target.args.len() == 1
            {
                return Ok(self.infer_pointer_target_kind(&target.args[0], locals));
            }
            return Ok(ValueKind::Unknown);
        }
        if let Some(name) = builtins::pointer_name(expr) {
            if name == "dereference" {
                if expr.args.len() != 1 {
                    return Ok(ValueKind::Unknown);
                }
                return Ok(self.infer_pointer_target_kind(&expr.args[0], locals));
            }
            return Ok(ValueKind::Unknown);
        }
        Ok(ValueKind::Unknown)
    }

    /// Kind of the value a pointer-shaped expression points at.
    pub(super) fn infer_pointer_target_kind(&self, expr: &Expr, locals: &LocalMap) -> ValueKind {
        match expr.kind {
            ExprKind::Name => {
                let Some(info) = locals.get(&expr.name) else {
                    return ValueKind::Unknown;
                };
                if matches!(info.kind, BindingKind::Pointer | BindingKind::Reference) {
                    info.value_kind
                } else {
                    ValueKind::Unknown
                }
            }
            ExprKind::Call => {
                if builtins::is_simple_call(expr, "location") && expr.args.len() == 1 {
                    let target = &expr.args[0];
                    if target.kind == ExprKind::Name {
                        if let Some(info) = locals.get(&target.name) {
                            return info.value_kind;
                        }
                    }
                    return ValueKind::Unknown;
                }
                if let Some(name) = builtins::operator_name(expr) {
                    if matches!(name, "plus" | "minus")
                        && expr.args.len() == 2
                        && is_pointer_operand(&expr.args[0], locals)
                        && !is_pointer_operand(&expr.args[1], locals)
                    {
                        return self.infer_pointer_target_kind(&expr.args[0], locals);
                    }
                }
                ValueKind::Unknown
            }
            _ => ValueKind::Unknown,
        }
    }
}
