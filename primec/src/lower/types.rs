//! Local binding model and the value-kind lattice used for inference.

use crate::ast::{Expr, Transform};

/// Value kind of a binding or expression result.
///
/// ```text
/// Unknown
///  +-- Bool
///  +-- Int32 --- Int64
///  +-- UInt64
///  +-- String   (value bindings only, never behind pointers/references)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Unknown,
    Int32,
    Int64,
    UInt64,
    Bool,
    String,
}

impl ValueKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "int" | "i32" => ValueKind::Int32,
            "i64" => ValueKind::Int64,
            "u64" => ValueKind::UInt64,
            "bool" => ValueKind::Bool,
            "string" => ValueKind::String,
            _ => ValueKind::Unknown,
        }
    }

    pub fn is_numeric_or_bool(self) -> bool {
        matches!(
            self,
            ValueKind::Int32 | ValueKind::Int64 | ValueKind::UInt64 | ValueKind::Bool
        )
    }

    /// True for the 64-bit-wide kinds (push/compare width selection).
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Int64 | ValueKind::UInt64)
    }
}

/// Category of a binding: plain value, explicit address, auto-dereferenced
/// address, or stack-allocated array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Value,
    Pointer,
    Reference,
    Array,
}

/// Where a string-typed local gets its bytes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringSource {
    /// Index into the module string table; the local holds that index.
    Table(u32),
    /// Index into the process argv; the local holds the integer index.
    Argv,
}

/// Everything the lowerer tracks about one named local.
#[derive(Debug, Clone)]
pub struct LocalInfo {
    pub index: u32,
    pub mutable: bool,
    pub kind: BindingKind,
    pub value_kind: ValueKind,
    pub string_source: Option<StringSource>,
}

impl LocalInfo {
    pub fn value(index: u32, value_kind: ValueKind, mutable: bool) -> Self {
        Self {
            index,
            mutable,
            kind: BindingKind::Value,
            value_kind,
            string_source: None,
        }
    }
}

/// Combine two kinds under numeric unification: identical kinds survive,
/// Int32 widens to Int64, unsigned only unifies with unsigned, and Bool or
/// String participation poisons to Unknown.
pub fn combine_numeric_kinds(left: ValueKind, right: ValueKind) -> ValueKind {
    use ValueKind::*;
    match (left, right) {
        (Unknown, _) | (_, Unknown) => Unknown,
        (String, _) | (_, String) => Unknown,
        (Bool, _) | (_, Bool) => Unknown,
        (UInt64, UInt64) => UInt64,
        (UInt64, _) | (_, UInt64) => Unknown,
        (Int64, Int64) | (Int64, Int32) | (Int32, Int64) => Int64,
        (Int32, Int32) => Int32,
    }
}

/// Unification for comparison operands: bools compare as Int32.
pub fn comparison_kind(left: ValueKind, right: ValueKind) -> ValueKind {
    let promote = |kind| {
        if kind == ValueKind::Bool {
            ValueKind::Int32
        } else {
            kind
        }
    };
    combine_numeric_kinds(promote(left), promote(right))
}

/// Qualifier transforms that never name a type.
pub fn is_binding_qualifier(name: &str) -> bool {
    matches!(
        name,
        "public"
            | "private"
            | "package"
            | "static"
            | "mut"
            | "copy"
            | "restrict"
            | "align_bytes"
            | "align_kbytes"
    )
}

fn is_float_type_name(name: &str) -> bool {
    matches!(name, "float" | "f32" | "f64")
}

pub fn is_binding_mutable(expr: &Expr) -> bool {
    expr.transforms.iter().any(|t| t.name == "mut")
}

/// Category implied by the binding's type transforms.
pub fn binding_kind(expr: &Expr) -> BindingKind {
    for transform in &expr.transforms {
        match transform.name.as_str() {
            "Reference" => return BindingKind::Reference,
            "Pointer" => return BindingKind::Pointer,
            "array" => return BindingKind::Array,
            _ => {}
        }
    }
    BindingKind::Value
}

/// Value kind implied by the binding's type transforms: the template
/// argument for pointer/reference/array bindings, the type name otherwise.
pub fn binding_value_kind(expr: &Expr) -> ValueKind {
    for transform in &expr.transforms {
        if is_binding_qualifier(&transform.name) {
            continue;
        }
        match transform.name.as_str() {
            "Pointer" | "Reference" | "array" => {
                return transform
                    .template_arg
                    .as_deref()
                    .map(ValueKind::from_type_name)
                    .unwrap_or(ValueKind::Unknown);
            }
            name => {
                let kind = ValueKind::from_type_name(name);
                if kind != ValueKind::Unknown {
                    return kind;
                }
            }
        }
    }
    ValueKind::Unknown
}

fn type_transform_matches(transform: &Transform, predicate: impl Fn(&str) -> bool) -> bool {
    if is_binding_qualifier(&transform.name) {
        return false;
    }
    if predicate(&transform.name) {
        return true;
    }
    if matches!(transform.name.as_str(), "Pointer" | "Reference") {
        if let Some(arg) = &transform.template_arg {
            return predicate(arg);
        }
    }
    false
}

/// True when the binding names a float type directly or through a
/// pointer/reference template argument.
pub fn is_float_binding(expr: &Expr) -> bool {
    expr.transforms
        .iter()
        .any(|t| type_transform_matches(t, is_float_type_name))
}

/// True when the binding names the string type directly or through a
/// pointer/reference template argument.
pub fn is_string_binding(expr: &Expr) -> bool {
    expr.transforms
        .iter()
        .any(|t| type_transform_matches(t, |name| name == "string"))
}
