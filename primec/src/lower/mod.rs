//! AST → IR lowering, the compiler core.
//!
//! `lower` translates a validated, monomorphized [`Program`] into an
//! [`IrModule`] containing exactly one function: the entry definition with
//! every user call inlined at its call site. All backend policy lives here —
//! allowed types, operand shapes, argument conventions, inline rules,
//! bounds checks — so the VM and the native emitter only ever see IR that
//! both can execute with identical observable semantics.
//!
//! The lowerer threads explicit state instead of recursing through shared
//! mutability: a per-compilation inline stack rejects recursive calls, and a
//! separate in-progress set rejects recursive return-type inference.

mod builtins;
mod call;
mod expr;
mod infer;
mod stmt;
#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;
pub mod types;

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::ast::{Definition, Expr, ExprKind, Program};
use crate::ir::{
    encode_print_flags, encode_print_string_imm, IrFunction, IrInstruction, IrModule, IrOpcode,
};

use infer::ReturnInfo;
use types::{is_binding_qualifier, LocalInfo};

/// Map from binding name to its local slot info. Control-flow blocks lower
/// against a copy, so names introduced inside a block stay scoped to it.
pub(crate) type LocalMap = HashMap<String, LocalInfo>;

/// Errors raised while lowering a program.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LowerError {
    #[error("native backend requires entry definition {0}")]
    MissingEntry(String),
    #[error("native backend only supports a single array<string> entry parameter")]
    EntryParameterCount,
    #[error("native backend entry parameter must be array<string>")]
    EntryParameterType,
    #[error("native backend does not allow entry parameter defaults")]
    EntryParameterDefault,
    #[error("native backend does not support float types")]
    FloatUnsupported,
    #[error("native backend does not support float literals")]
    FloatLiteral,
    #[error("native backend does not support string literals")]
    StringLiteralExpr,
    #[error("native backend does not support string pointers or references")]
    StringPointer,
    #[error("conflicting return types on {0}")]
    ConflictingReturnTypes(String),
    #[error("unable to infer return type on {0}")]
    CannotInferReturn(String),
    #[error("native backend return type inference requires explicit annotation on {0}")]
    RecursiveInference(String),
    #[error("native backend does not support return type on {0}")]
    UnsupportedReturnType(String),
    #[error("native backend does not support string return types on {0}")]
    StringReturn(String),
    #[error("native backend requires typed parameters on {0}")]
    UntypedParameter(String),
    #[error("native backend requires typed bindings on {0}")]
    UntypedBinding(String),
    #[error("native backend cannot resolve definition: {0}")]
    UnresolvedDefinition(String),
    #[error("native backend does not support recursive calls: {0}")]
    RecursiveCall(String),
    #[error("native backend requires an explicit return statement")]
    MissingReturn,
    #[error("{0} requires exactly one argument")]
    OneArgument(String),
    #[error("{0} requires exactly two arguments")]
    TwoArguments(String),
    #[error("{0} requires exactly three arguments")]
    ThreeArguments(String),
    #[error("argument count mismatch")]
    ArgumentCountMismatch,
    #[error("unknown named argument: {0}")]
    UnknownNamedArgument(String),
    #[error("named argument duplicates parameter: {0}")]
    DuplicateNamedArgument(String),
    #[error("assign target must be a known binding: {0}")]
    AssignTargetUnknown(String),
    #[error("assign target must be mutable: {0}")]
    AssignTargetNotMutable(String),
    #[error("assign target must be a mutable binding")]
    AssignDerefNotMutable,
    #[error("assign target must be a mutable pointer binding")]
    AssignDerefNotPointer,
    #[error("native backend only supports assign to local names or dereference")]
    AssignTargetShape,
    #[error("reference binding requires location(...) initializer")]
    ReferenceInitializer,
    #[error("binding redefines existing name: {0}")]
    BindingRedefinesName(String),
    #[error("pointer arithmetic does not support pointer + pointer")]
    PointerPlusPointer,
    #[error("pointer arithmetic requires pointer on the left")]
    PointerOnRight,
    #[error("pointer arithmetic requires an integer offset")]
    PointerOffset,
    #[error("negate requires numeric operand")]
    NegateOperand,
    #[error("negate does not support unsigned operands")]
    NegateUnsigned,
    #[error("unsupported operand types for {0}")]
    OperandTypes(String),
    #[error("boolean conversion requires numeric operand")]
    BoolConversion,
    #[error("clamp requires numeric arguments of the same type")]
    ClampArguments,
    #[error("convert requires exactly one template argument")]
    ConvertTemplateArg,
    #[error(
        "native backend only supports convert<int>, convert<i32>, convert<i64>, convert<u64>, or convert<bool>"
    )]
    ConvertTarget,
    #[error("i32 literal out of range for native backend")]
    LiteralOutOfRange,
    #[error("native backend does not know identifier: {0}")]
    UnknownIdentifier(String),
    #[error("native backend only supports count() on entry arguments")]
    EntryArgsUsage,
    #[error("native backend only supports entry argument indexing")]
    EntryArgsIndexing,
    #[error("native backend only supports entry argument indexing in print calls or string bindings")]
    EntryArgsContext,
    #[error("native backend only supports i32 indices for {0}")]
    IndexKind(String),
    #[error("native backend only supports at() on numeric/bool arrays")]
    ArrayElementKind,
    #[error("native backend only supports byte access on table-backed strings")]
    StringByteSource,
    #[error("location requires a local binding")]
    LocationTarget,
    #[error("dereference requires a pointer or reference")]
    DereferenceTarget,
    #[error("array literal requires exactly one template argument")]
    ArrayTemplateArg,
    #[error("native backend only supports numeric/bool array literals")]
    ArrayLiteralKind,
    #[error("native backend requires array literal elements to be numeric/bool values")]
    ArrayElementValue,
    #[error("array literal element type mismatch")]
    ArrayElementMismatch,
    #[error("array literal too large for native backend")]
    ArrayTooLarge,
    #[error("native backend does not support {0} literals")]
    CollectionLiteral(String),
    #[error("native backend expects then/else blocks to be calls")]
    BlockShape,
    #[error("native backend does not support arguments on then/else blocks")]
    BlockArguments,
    #[error("if requires condition, then, else")]
    IfShape,
    #[error("if requires then/else blocks")]
    IfBlocks,
    #[error("if does not accept trailing block arguments")]
    IfTrailingBlock,
    #[error("native backend does not support if/then/else in expression context")]
    IfInExpression,
    #[error("native backend only supports arithmetic/comparison/clamp/convert/pointer/assign calls in expressions")]
    CallShape,
    #[error("repeat count requires integer or bool")]
    RepeatCount,
    #[error("native backend does not support block arguments on calls")]
    CallBlockArguments,
    #[error("void call not allowed in expression context: {0}")]
    VoidCallInExpression(String),
    #[error("return value not allowed for void definition")]
    ReturnValueInVoid,
    #[error("native backend only supports returning numeric or bool values")]
    ReturnValueKind,
    #[error("{0} is only supported as a statement in the native backend")]
    PrintInExpression(String),
    #[error("{0} does not support body arguments")]
    PrintBodyArguments(String),
    #[error("{0} requires a numeric/bool or string literal/binding argument")]
    PrintArgument(String),
    #[error("native backend requires string bindings to use string literals, bindings, or entry args")]
    StringBindingInitializer,
    #[error("native backend requires string arguments to use string literals, bindings, or entry args")]
    StringArgumentSource,
    #[error("native backend only supports numeric/bool or string parameters")]
    ParameterKind,
}

/// Per-invocation record of an inlined call body being lowered.
#[derive(Debug)]
struct InlineContext {
    returns_void: bool,
    /// Slot the callee's `return(x)` values store into; `None` for void.
    return_local: Option<u32>,
    /// Indices of `Jump` placeholders to patch to just past the body.
    return_jumps: Vec<usize>,
}

/// Lowering state for one `lower` call.
pub(crate) struct Lowerer<'p> {
    defs: HashMap<&'p str, &'p Definition>,
    /// Name of the entry's `array<string>` parameter, when declared.
    entry_args_name: Option<String>,
    entry_returns_void: bool,
    saw_return: bool,
    code: Vec<IrInstruction>,
    next_local: u32,
    string_table: Vec<String>,
    return_cache: HashMap<String, ReturnInfo>,
    inference_stack: HashSet<String>,
    inline_stack: HashSet<String>,
    inline_contexts: Vec<InlineContext>,
}

/// Lower `program` to a single-function IR module rooted at `entry_path`.
pub fn lower(program: &Program, entry_path: &str) -> Result<IrModule, LowerError> {
    Lowerer::new(program, entry_path)?.run(program, entry_path)
}

impl<'p> Lowerer<'p> {
    fn new(program: &'p Program, entry_path: &str) -> Result<Self, LowerError> {
        let entry = program
            .definitions
            .iter()
            .find(|def| def.full_path == entry_path)
            .ok_or_else(|| LowerError::MissingEntry(entry_path.to_string()))?;

        let mut defs: HashMap<&str, &Definition> = HashMap::new();
        for def in &program.definitions {
            defs.entry(def.full_path.as_str()).or_insert(def);
        }

        let mut has_return_transform = false;
        let mut returns_void = false;
        for transform in &entry.transforms {
            if transform.name != "return" {
                continue;
            }
            if has_return_transform {
                return Err(LowerError::ConflictingReturnTypes(entry_path.to_string()));
            }
            has_return_transform = true;
            if transform.template_arg.as_deref() == Some("void") {
                returns_void = true;
            }
        }
        if !has_return_transform && entry.return_expr.is_none() {
            returns_void = true;
        }

        let entry_args_name = Self::entry_args_parameter(entry)?;

        Ok(Self {
            defs,
            entry_args_name,
            entry_returns_void: returns_void,
            saw_return: false,
            code: Vec::new(),
            next_local: 0,
            string_table: Vec::new(),
            return_cache: HashMap::new(),
            inference_stack: HashSet::new(),
            inline_stack: HashSet::new(),
            inline_contexts: Vec::new(),
        })
    }

    fn run(mut self, program: &Program, entry_path: &str) -> Result<IrModule, LowerError> {
        let entry = program
            .definitions
            .iter()
            .find(|def| def.full_path == entry_path)
            .ok_or_else(|| LowerError::MissingEntry(entry_path.to_string()))?;

        let mut locals = LocalMap::new();
        for stmt in &entry.statements {
            self.emit_statement(stmt, &mut locals)?;
        }

        if !self.saw_return {
            if self.entry_returns_void {
                self.emit(IrOpcode::ReturnVoid, 0);
            } else {
                return Err(LowerError::MissingReturn);
            }
        }

        Ok(IrModule {
            functions: vec![IrFunction {
                name: entry_path.to_string(),
                instructions: self.code,
            }],
            entry_index: 0,
            string_table: self.string_table,
        })
    }

    /// Validate the entry's parameter list and return the entry-args name.
    fn entry_args_parameter(entry: &Definition) -> Result<Option<String>, LowerError> {
        if entry.parameters.is_empty() {
            return Ok(None);
        }
        if entry.parameters.len() != 1 {
            return Err(LowerError::EntryParameterCount);
        }
        let param = &entry.parameters[0];
        let mut type_name = "";
        let mut template_arg = None;
        for transform in &param.transforms {
            if is_binding_qualifier(&transform.name) || !transform.arguments.is_empty() {
                continue;
            }
            type_name = &transform.name;
            template_arg = transform.template_arg.as_deref();
        }
        if type_name != "array" || template_arg != Some("string") {
            return Err(LowerError::EntryParameterType);
        }
        if !param.args.is_empty() {
            return Err(LowerError::EntryParameterDefault);
        }
        Ok(Some(param.name.clone()))
    }

    /// True when `expr` names the entry-args parameter and no local shadows
    /// that name.
    fn is_entry_args_name(&self, expr: &Expr, locals: &LocalMap) -> bool {
        match &self.entry_args_name {
            Some(name) => {
                expr.kind == ExprKind::Name && &expr.name == name && !locals.contains_key(name)
            }
            None => false,
        }
    }

    fn emit(&mut self, op: IrOpcode, imm: u64) {
        self.code.push(IrInstruction::new(op, imm));
    }

    /// Index the next emitted instruction will occupy.
    fn here(&self) -> usize {
        self.code.len()
    }

    /// Emit a placeholder `op` whose immediate is patched later.
    fn emit_placeholder(&mut self, op: IrOpcode) -> usize {
        let index = self.here();
        self.emit(op, 0);
        index
    }

    fn patch_jump(&mut self, at: usize, target: usize) {
        self.code[at].imm = target as u64;
    }

    fn alloc_temp_local(&mut self) -> u32 {
        let index = self.next_local;
        self.next_local += 1;
        index
    }

    /// Intern `text`, reusing an existing table entry when equal.
    fn intern_string(&mut self, text: &str) -> u32 {
        if let Some(index) = self.string_table.iter().position(|s| s == text) {
            return index as u32;
        }
        self.string_table.push(text.to_string());
        (self.string_table.len() - 1) as u32
    }

    /// Emit the out-of-bounds failure path: print the diagnostic to stderr
    /// and return exit code 3.
    fn emit_array_index_out_of_bounds(&mut self) {
        let flags = encode_print_flags(true, true);
        let index = self.intern_string("array index out of bounds");
        self.emit(
            IrOpcode::PrintString,
            encode_print_string_imm(index, flags),
        );
        self.emit(IrOpcode::PushI32, 3);
        self.emit(IrOpcode::ReturnI32, 0);
    }

    fn resolve_definition_call(&self, expr: &Expr) -> Option<&'p Definition> {
        if expr.kind != ExprKind::Call || expr.is_binding || expr.is_method_call {
            return None;
        }
        self.defs.get(expr.resolved_path().as_str()).copied()
    }
}
