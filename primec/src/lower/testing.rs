//! AST fixture builders for lowering tests.
//!
//! Programs are built directly as AST values; the front end is out of scope
//! here, so these helpers take the place of parsed source.
#![allow(dead_code)]

use crate::ast::{Definition, Expr, ExprKind, Program, Transform};

pub(super) fn lit32(value: i64) -> Expr {
    Expr::new(ExprKind::Literal {
        value,
        width: 32,
        unsigned: false,
    })
}

pub(super) fn lit64(value: i64) -> Expr {
    Expr::new(ExprKind::Literal {
        value,
        width: 64,
        unsigned: false,
    })
}

pub(super) fn litu64(value: u64) -> Expr {
    Expr::new(ExprKind::Literal {
        value: value as i64,
        width: 64,
        unsigned: true,
    })
}

pub(super) fn bool_lit(value: bool) -> Expr {
    Expr::new(ExprKind::BoolLiteral(value))
}

pub(super) fn str_lit(text: &str) -> Expr {
    Expr::new(ExprKind::StringLiteral(text.to_string()))
}

pub(super) fn name(ident: &str) -> Expr {
    let mut expr = Expr::new(ExprKind::Name);
    expr.name = ident.to_string();
    expr
}

pub(super) fn call(callee: &str, args: Vec<Expr>) -> Expr {
    let mut expr = Expr::new(ExprKind::Call);
    expr.name = callee.to_string();
    expr.arg_names = vec![None; args.len()];
    expr.args = args;
    expr
}

pub(super) fn call_t(callee: &str, template_args: &[&str], args: Vec<Expr>) -> Expr {
    let mut expr = call(callee, args);
    expr.template_args = template_args.iter().map(|s| s.to_string()).collect();
    expr
}

/// Parse `"Pointer<i32>"`-style shorthand into a [`Transform`].
pub(super) fn transform(text: &str) -> Transform {
    match text.split_once('<') {
        Some((name, rest)) => {
            Transform::with_template_arg(name, rest.trim_end_matches('>'))
        }
        None => Transform::new(text),
    }
}

/// `[types...] name(init)` binding statement.
pub(super) fn binding(ident: &str, types: &[&str], init: Expr) -> Expr {
    let mut expr = call(ident, vec![init]);
    expr.is_binding = true;
    expr.transforms = types.iter().map(|t| transform(t)).collect();
    expr
}

pub(super) fn ret(value: Expr) -> Expr {
    call("return", vec![value])
}

pub(super) fn ret_void() -> Expr {
    call("return", vec![])
}

fn block(callee: &str, body: Vec<Expr>) -> Expr {
    let mut expr = call(callee, vec![]);
    expr.body_arguments = body;
    expr
}

pub(super) fn if_stmt(cond: Expr, then_body: Vec<Expr>, else_body: Vec<Expr>) -> Expr {
    call(
        "if",
        vec![cond, block("then", then_body), block("else", else_body)],
    )
}

pub(super) fn repeat_stmt(count: Expr, body: Vec<Expr>) -> Expr {
    let mut expr = call("repeat", vec![count]);
    expr.body_arguments = body;
    expr
}

/// Typed parameter, optionally with a default value in `args`.
pub(super) fn param(ident: &str, types: &[&str], default: Option<Expr>) -> Expr {
    let mut expr = Expr::new(ExprKind::Call);
    expr.name = ident.to_string();
    expr.is_binding = true;
    expr.transforms = types.iter().map(|t| transform(t)).collect();
    if let Some(default) = default {
        expr.args.push(default);
    }
    expr
}

fn find_return(statements: &[Expr]) -> Option<&Expr> {
    for stmt in statements {
        if super::builtins::is_return_call(stmt) {
            return Some(stmt);
        }
        for nested in stmt.args.iter().chain(&stmt.body_arguments) {
            if let Some(found) = find_return(std::slice::from_ref(nested)) {
                return Some(found);
            }
        }
    }
    None
}

pub(super) fn def(path: &str, transforms: &[&str], parameters: Vec<Expr>, statements: Vec<Expr>) -> Definition {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let return_stmt = find_return(&statements);
    let has_return_statement = return_stmt.is_some();
    let return_expr = return_stmt.and_then(|stmt| stmt.args.first()).cloned();
    Definition {
        name,
        full_path: path.to_string(),
        namespace_prefix: String::new(),
        transforms: transforms.iter().map(|t| transform(t)).collect(),
        template_args: Vec::new(),
        parameters,
        statements,
        return_expr,
        has_return_statement,
    }
}

pub(super) fn program(definitions: Vec<Definition>) -> Program {
    Program {
        definitions,
        executions: Vec::new(),
        imports: Vec::new(),
    }
}

/// `[return<int>] main() { statements }` single-definition program.
pub(super) fn main_program(return_type: &str, statements: Vec<Expr>) -> Program {
    program(vec![def(
        "/main",
        &[&format!("return<{return_type}>")],
        vec![],
        statements,
    )])
}
