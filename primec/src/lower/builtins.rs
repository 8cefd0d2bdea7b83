//! Recognition of builtin call names.
//!
//! Builtins are only matched for unqualified names: a leading slash is
//! stripped, and any remaining slash means the call names a user
//! definition, never a builtin.

use crate::ast::{Expr, ExprKind};

/// The unqualified callee name, if this call can name a builtin.
pub(super) fn simple_call_name(expr: &Expr) -> Option<&str> {
    if expr.kind != ExprKind::Call || expr.name.is_empty() {
        return None;
    }
    let name = expr.name.strip_prefix('/').unwrap_or(&expr.name);
    if name.contains('/') {
        return None;
    }
    Some(name)
}

pub(super) fn is_simple_call(expr: &Expr, name: &str) -> bool {
    simple_call_name(expr) == Some(name)
}

pub(super) fn is_return_call(expr: &Expr) -> bool {
    is_simple_call(expr, "return")
}

pub(super) fn is_if_call(expr: &Expr) -> bool {
    is_simple_call(expr, "if")
}

pub(super) fn is_then_call(expr: &Expr) -> bool {
    is_simple_call(expr, "then")
}

pub(super) fn is_else_call(expr: &Expr) -> bool {
    is_simple_call(expr, "else")
}

pub(super) fn is_repeat_call(expr: &Expr) -> bool {
    is_simple_call(expr, "repeat")
}

/// Output target of a print builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PrintTarget {
    Out,
    Err,
}

/// One of the four print builtins.
#[derive(Debug, Clone, Copy)]
pub(super) struct PrintBuiltin {
    pub target: PrintTarget,
    pub newline: bool,
    pub name: &'static str,
}

pub(super) fn print_builtin(expr: &Expr) -> Option<PrintBuiltin> {
    let builtin = match simple_call_name(expr)? {
        "print" => PrintBuiltin {
            target: PrintTarget::Out,
            newline: false,
            name: "print",
        },
        "print_line" => PrintBuiltin {
            target: PrintTarget::Out,
            newline: true,
            name: "print_line",
        },
        "print_error" => PrintBuiltin {
            target: PrintTarget::Err,
            newline: false,
            name: "print_error",
        },
        "print_line_error" => PrintBuiltin {
            target: PrintTarget::Err,
            newline: true,
            name: "print_line_error",
        },
        _ => return None,
    };
    Some(builtin)
}

/// `plus`/`minus`/`multiply`/`divide`/`negate`.
pub(super) fn operator_name(expr: &Expr) -> Option<&str> {
    match simple_call_name(expr)? {
        name @ ("plus" | "minus" | "multiply" | "divide" | "negate") => Some(name),
        _ => None,
    }
}

/// The comparison/logical family, including `not`/`and`/`or`.
pub(super) fn comparison_name(expr: &Expr) -> Option<&str> {
    match simple_call_name(expr)? {
        name @ ("greater_than" | "less_than" | "equal" | "not_equal" | "greater_equal"
        | "less_equal" | "and" | "or" | "not") => Some(name),
        _ => None,
    }
}

pub(super) fn is_clamp_call(expr: &Expr) -> bool {
    is_simple_call(expr, "clamp")
}

pub(super) fn is_convert_call(expr: &Expr) -> bool {
    is_simple_call(expr, "convert")
}

/// `at` / `at_unsafe`.
pub(super) fn array_access_name(expr: &Expr) -> Option<&str> {
    match simple_call_name(expr)? {
        name @ ("at" | "at_unsafe") => Some(name),
        _ => None,
    }
}

/// `dereference` / `location`.
pub(super) fn pointer_name(expr: &Expr) -> Option<&str> {
    match simple_call_name(expr)? {
        name @ ("dereference" | "location") => Some(name),
        _ => None,
    }
}

/// `array` / `map` collection literals.
pub(super) fn collection_name(expr: &Expr) -> Option<&str> {
    match simple_call_name(expr)? {
        name @ ("array" | "map") => Some(name),
        _ => None,
    }
}
