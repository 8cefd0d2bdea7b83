//! AST entities consumed by the IR lowerer.
//!
//! These are produced by the out-of-scope front-end stages (include
//! resolution, text filters, parsing, validation, template monomorphization)
//! and arrive here fully resolved: every definition has an absolute
//! slash-rooted `full_path`, method calls have been rewritten to plain calls,
//! and template arguments are concrete type names.
//!
//! Everything in the surface language is uniformly a name-with-transforms
//! call, so the expression node is a single struct tagged by [`ExprKind`]
//! rather than a deep tree of statement/expression variants.

use serde::{Deserialize, Serialize};

/// A bracketed transform attached to a definition, binding, or call,
/// e.g. `return<int>`, `Pointer<i32>`, `mut`, `align_bytes(64)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub name: String,
    /// The `<T>` payload, when present.
    pub template_arg: Option<String>,
    /// The `(...)` payload, when present (e.g. `align_bytes(64)`).
    pub arguments: Vec<String>,
}

impl Transform {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_arg: None,
            arguments: Vec::new(),
        }
    }

    pub fn with_template_arg(name: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template_arg: Some(arg.into()),
            arguments: Vec::new(),
        }
    }
}

/// Discriminant of an expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Integer literal. `width` is 32 or 64; unsigned literals are stored
    /// with their bit pattern in `value`.
    Literal { value: i64, width: u8, unsigned: bool },
    /// Float literal, kept as source text. The native pipeline rejects these
    /// during lowering; the text form is only needed for diagnostics.
    FloatLiteral { text: String, width: u8 },
    BoolLiteral(bool),
    /// String literal, already decoded by the front end.
    StringLiteral(String),
    Name,
    Call,
}

/// An expression or statement. Bindings, control flow, and calls all share
/// this shape; `is_binding` marks `[i32 mut] x(init)` forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// Identifier for `Name` nodes; callee name (possibly slash-rooted) for
    /// `Call` nodes.
    pub name: String,
    /// Positional and named arguments in source order.
    pub args: Vec<Expr>,
    /// Parallel to `args`; a `Some` entry names the parameter the argument
    /// binds to.
    pub arg_names: Vec<Option<String>>,
    /// The trailing `{ ... }` block, when present.
    pub body_arguments: Vec<Expr>,
    pub template_args: Vec<String>,
    pub namespace_prefix: String,
    pub transforms: Vec<Transform>,
    pub is_binding: bool,
    pub is_method_call: bool,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            name: String::new(),
            args: Vec::new(),
            arg_names: Vec::new(),
            body_arguments: Vec::new(),
            template_args: Vec::new(),
            namespace_prefix: String::new(),
            transforms: Vec::new(),
            is_binding: false,
            is_method_call: false,
        }
    }

    /// Resolve this call's name to an absolute slash-rooted path.
    pub fn resolved_path(&self) -> String {
        if self.name.starts_with('/') {
            return self.name.clone();
        }
        if !self.namespace_prefix.is_empty() {
            return format!("{}/{}", self.namespace_prefix, self.name);
        }
        format!("/{}", self.name)
    }
}

/// A user definition after monomorphization. Parameters are binding
/// expressions whose `args` hold the default value, when one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub full_path: String,
    pub namespace_prefix: String,
    pub transforms: Vec<Transform>,
    pub template_args: Vec<String>,
    pub parameters: Vec<Expr>,
    pub statements: Vec<Expr>,
    pub return_expr: Option<Expr>,
    pub has_return_statement: bool,
}

/// A top-level execution request (`run`-style call outside any definition).
/// The lowerer does not consume these; they are carried for the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub name: String,
    pub full_path: String,
    pub namespace_prefix: String,
    pub transforms: Vec<Transform>,
    pub template_args: Vec<String>,
    pub arguments: Vec<Expr>,
    pub body_arguments: Vec<Expr>,
}

/// A validated, monomorphized whole program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub definitions: Vec<Definition>,
    pub executions: Vec<Execution>,
    pub imports: Vec<String>,
}
