//! Lowering tests: end-to-end through the VM where the opcode subset
//! allows, structural checks on the emitted IR otherwise.

use pretty_assertions::assert_eq;

use super::testing::*;
use super::LowerError;
use crate::ast::ExprKind;
use crate::ir::{
    print_flags, print_string_index, IrModule, IrOpcode, PRINT_FLAG_NEWLINE, PRINT_FLAG_STDERR,
};
use crate::lower::lower;
use crate::vm::Vm;

fn run(module: &IrModule) -> u64 {
    Vm::new().execute(module).unwrap()
}

fn lower_main(return_type: &str, statements: Vec<crate::ast::Expr>) -> IrModule {
    lower(&main_program(return_type, statements), "/main").unwrap()
}

fn ops(module: &IrModule) -> Vec<IrOpcode> {
    module.functions[0]
        .instructions
        .iter()
        .map(|inst| inst.op)
        .collect()
}

#[test]
fn test_add_i32_literals() {
    let module = lower_main(
        "int",
        vec![ret(call("plus", vec![lit32(1), lit32(2)]))],
    );
    assert_eq!(run(&module), 3);
}

#[test]
fn test_add_i64_literals() {
    let module = lower_main("i64", vec![ret(call("plus", vec![lit64(1), lit64(2)]))]);
    assert_eq!(run(&module), 3);
    assert!(ops(&module).contains(&IrOpcode::AddI64));
}

#[test]
fn test_mutable_binding_and_assign() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(2)),
            call("assign", vec![name("v"), call("plus", vec![name("v"), lit32(3)])]),
            ret(name("v")),
        ],
    );
    assert_eq!(run(&module), 5);
}

#[test]
fn test_pointer_dereference_assign() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(1)),
            binding(
                "p",
                &["Pointer<i32>", "mut"],
                call("location", vec![name("v")]),
            ),
            call(
                "assign",
                vec![call("dereference", vec![name("p")]), lit32(7)],
            ),
            ret(call("dereference", vec![name("p")])),
        ],
    );
    assert_eq!(run(&module), 7);
}

#[test]
fn test_if_less_equal() {
    let module = lower_main(
        "int",
        vec![if_stmt(
            call("less_equal", vec![lit32(1), lit32(1)]),
            vec![ret(lit32(7))],
            vec![ret(lit32(3))],
        )],
    );
    assert_eq!(run(&module), 7);
}

#[test]
fn test_clamp_above_range() {
    let module = lower_main(
        "int",
        vec![ret(call("clamp", vec![lit32(5), lit32(2), lit32(4)]))],
    );
    assert_eq!(run(&module), 4);
}

#[test]
fn test_clamp_below_range() {
    let module = lower_main(
        "int",
        vec![ret(call("clamp", vec![lit32(1), lit32(2), lit32(4)]))],
    );
    assert_eq!(run(&module), 2);
}

#[test]
fn test_array_literal_indexing() {
    let module = lower_main(
        "int",
        vec![
            binding(
                "xs",
                &["array<i32>"],
                call_t("array", &["i32"], vec![lit32(10), lit32(20), lit32(30)]),
            ),
            ret(call("at", vec![name("xs"), lit32(2)])),
        ],
    );
    assert_eq!(run(&module), 30);
}

#[test]
fn test_array_count() {
    let module = lower_main(
        "int",
        vec![
            binding(
                "xs",
                &["array<i32>"],
                call_t("array", &["i32"], vec![lit32(10), lit32(20)]),
            ),
            ret(call("count", vec![name("xs")])),
        ],
    );
    assert_eq!(run(&module), 2);
}

#[test]
fn test_array_at_emits_bounds_checks() {
    let module = lower_main(
        "int",
        vec![
            binding(
                "xs",
                &["array<i32>"],
                call_t("array", &["i32"], vec![lit32(10)]),
            ),
            ret(call("at", vec![name("xs"), lit32(0)])),
        ],
    );
    assert_eq!(
        module.string_table,
        vec!["array index out of bounds".to_string()]
    );
    // The failure path prints to stderr with a newline and exits 3.
    let instructions = &module.functions[0].instructions;
    let print = instructions
        .iter()
        .position(|inst| inst.op == IrOpcode::PrintString)
        .unwrap();
    assert_eq!(print_string_index(instructions[print].imm), 0);
    assert_eq!(
        print_flags(instructions[print].imm),
        PRINT_FLAG_NEWLINE | PRINT_FLAG_STDERR
    );
    assert_eq!(instructions[print + 1].op, IrOpcode::PushI32);
    assert_eq!(instructions[print + 1].imm, 3);
    assert_eq!(instructions[print + 2].op, IrOpcode::ReturnI32);
}

#[test]
fn test_array_at_unsafe_has_no_bounds_checks() {
    let module = lower_main(
        "int",
        vec![
            binding(
                "xs",
                &["array<i32>"],
                call_t("array", &["i32"], vec![lit32(10)]),
            ),
            ret(call("at_unsafe", vec![name("xs"), lit32(0)])),
        ],
    );
    assert!(module.string_table.is_empty());
    assert!(!ops(&module).contains(&IrOpcode::PrintString));
}

#[test]
fn test_inline_call_with_positional_args() {
    let helper = def(
        "/add2",
        &["return<int>"],
        vec![param("a", &["i32"], None), param("b", &["i32"], None)],
        vec![ret(call("plus", vec![name("a"), name("b")]))],
    );
    let main = def(
        "/main",
        &["return<int>"],
        vec![],
        vec![ret(call("/add2", vec![lit32(4), lit32(9)]))],
    );
    let module = lower(&program(vec![main, helper]), "/main").unwrap();
    assert_eq!(run(&module), 13);
}

#[test]
fn test_inline_call_named_args_and_default() {
    let helper = def(
        "/scale",
        &["return<int>"],
        vec![
            param("value", &["i32"], None),
            param("by", &["i32"], Some(lit32(10))),
        ],
        vec![ret(call("multiply", vec![name("value"), name("by")]))],
    );
    // scale(value: 3) uses the default multiplier.
    let mut call_expr = call("/scale", vec![lit32(3)]);
    call_expr.arg_names = vec![Some("value".to_string())];
    let main = def("/main", &["return<int>"], vec![], vec![ret(call_expr)]);
    let module = lower(&program(vec![main, helper]), "/main").unwrap();
    assert_eq!(run(&module), 30);
}

#[test]
fn test_inline_call_named_after_positional() {
    let helper = def(
        "/sub",
        &["return<int>"],
        vec![param("a", &["i32"], None), param("b", &["i32"], None)],
        vec![ret(call("minus", vec![name("a"), name("b")]))],
    );
    let mut call_expr = call("/sub", vec![lit32(9), lit32(4)]);
    call_expr.arg_names = vec![None, Some("b".to_string())];
    let main = def("/main", &["return<int>"], vec![], vec![ret(call_expr)]);
    let module = lower(&program(vec![main, helper]), "/main").unwrap();
    assert_eq!(run(&module), 5);
}

#[test]
fn test_inline_void_call_statement() {
    let helper = def(
        "/noop",
        &["return<void>"],
        vec![param("x", &["i32", "mut"], None)],
        vec![call("assign", vec![name("x"), lit32(1)])],
    );
    let main = def(
        "/main",
        &["return<int>"],
        vec![],
        vec![call("/noop", vec![lit32(5)]), ret(lit32(2))],
    );
    let module = lower(&program(vec![main, helper]), "/main").unwrap();
    assert_eq!(run(&module), 2);
}

#[test]
fn test_inline_early_return_jumps_past_body() {
    let helper = def(
        "/pick",
        &["return<int>"],
        vec![param("flag", &["bool"], None)],
        vec![
            if_stmt(name("flag"), vec![ret(lit32(1))], vec![]),
            ret(lit32(2)),
        ],
    );
    let main = def(
        "/main",
        &["return<int>"],
        vec![],
        vec![ret(call(
            "plus",
            vec![
                call("/pick", vec![bool_lit(true)]),
                call("/pick", vec![bool_lit(false)]),
            ],
        ))],
    );
    let module = lower(&program(vec![main, helper]), "/main").unwrap();
    assert_eq!(run(&module), 3);
}

#[test]
fn test_recursive_call_rejected() {
    let looping = def(
        "/loop",
        &["return<int>"],
        vec![],
        vec![ret(call("/loop", vec![]))],
    );
    let main = def(
        "/main",
        &["return<int>"],
        vec![],
        vec![ret(call("/loop", vec![]))],
    );
    let err = lower(&program(vec![main, looping]), "/main").unwrap_err();
    assert_eq!(err, LowerError::RecursiveCall("/loop".to_string()));
}

#[test]
fn test_repeat_accumulates() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(0)),
            repeat_stmt(
                lit32(3),
                vec![call(
                    "assign",
                    vec![name("v"), call("plus", vec![name("v"), lit32(2)])],
                )],
            ),
            ret(name("v")),
        ],
    );
    assert_eq!(run(&module), 6);
}

#[test]
fn test_repeat_zero_count_skips_body() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(9)),
            repeat_stmt(
                lit32(0),
                vec![call("assign", vec![name("v"), lit32(1)])],
            ),
            ret(name("v")),
        ],
    );
    assert_eq!(run(&module), 9);
}

#[test]
fn test_and_short_circuits() {
    let module = lower_main(
        "int",
        vec![ret(call(
            "and",
            vec![
                call("equal", vec![lit32(1), lit32(2)]),
                call("equal", vec![lit32(1), lit32(1)]),
            ],
        ))],
    );
    assert_eq!(run(&module), 0);
}

#[test]
fn test_or_of_false_and_true() {
    let module = lower_main(
        "int",
        vec![ret(call(
            "or",
            vec![
                call("equal", vec![lit32(1), lit32(2)]),
                call("equal", vec![lit32(3), lit32(3)]),
            ],
        ))],
    );
    assert_eq!(run(&module), 1);
}

#[test]
fn test_not() {
    let module = lower_main("int", vec![ret(call("not", vec![lit32(0)]))]);
    assert_eq!(run(&module), 1);
}

#[test]
fn test_convert_bool() {
    let module = lower_main(
        "int",
        vec![ret(call_t("convert", &["bool"], vec![lit32(42)]))],
    );
    assert_eq!(run(&module), 1);
}

#[test]
fn test_convert_widening_is_noop() {
    let module = lower_main(
        "i64",
        vec![ret(call_t("convert", &["i64"], vec![lit32(5)]))],
    );
    assert_eq!(run(&module), 5);
}

#[test]
fn test_negate() {
    let module = lower_main("int", vec![ret(call("negate", vec![lit32(-8)]))]);
    assert_eq!(run(&module), 8);
}

#[test]
fn test_unsigned_divide_selects_divu64() {
    let module = lower_main(
        "u64",
        vec![ret(call("divide", vec![litu64(10), litu64(3)]))],
    );
    assert!(ops(&module).contains(&IrOpcode::DivU64));
    assert_eq!(run(&module), 3);
}

#[test]
fn test_unsigned_compare_selects_u64_opcodes() {
    let module = lower_main(
        "int",
        vec![ret(call("less_than", vec![litu64(u64::MAX), litu64(1)]))],
    );
    assert!(ops(&module).contains(&IrOpcode::CmpLtU64));
    assert_eq!(run(&module), 0);
}

#[test]
fn test_reference_auto_dereferences() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(4)),
            binding("r", &["Reference<i32>"], call("location", vec![name("v")])),
            ret(call("plus", vec![name("r"), lit32(1)])),
        ],
    );
    assert_eq!(run(&module), 5);
}

#[test]
fn test_assign_through_reference() {
    let module = lower_main(
        "int",
        vec![
            binding("v", &["i32", "mut"], lit32(1)),
            binding(
                "r",
                &["Reference<i32>", "mut"],
                call("location", vec![name("v")]),
            ),
            call("assign", vec![name("r"), lit32(6)]),
            ret(name("v")),
        ],
    );
    assert_eq!(run(&module), 6);
}

#[test]
fn test_pointer_arithmetic_walks_array() {
    // Element 1 lives 32 bytes past the count slot.
    let module = lower_main(
        "int",
        vec![
            binding(
                "xs",
                &["array<i32>"],
                call_t("array", &["i32"], vec![lit32(5), lit32(8)]),
            ),
            binding("p", &["Pointer<i32>"], name("xs")),
            ret(call(
                "dereference",
                vec![call("plus", vec![name("p"), lit32(32)])],
            )),
        ],
    );
    assert_eq!(run(&module), 8);
}

#[test]
fn test_void_entry_appends_return_void() {
    let program = program(vec![def("/main", &["return<void>"], vec![], vec![])]);
    let module = lower(&program, "/main").unwrap();
    assert_eq!(ops(&module), vec![IrOpcode::ReturnVoid]);
    assert_eq!(run(&module), 0);
}

#[test]
fn test_inferred_return_kind_without_annotation() {
    // No return<T>: the i64 literal fixes the return width.
    let program = program(vec![def("/main", &[], vec![], vec![ret(lit64(9))])]);
    let module = lower(&program, "/main").unwrap();
    assert!(ops(&module).contains(&IrOpcode::ReturnI64));
    assert_eq!(run(&module), 9);
}

#[test]
fn test_bool_return_uses_i32() {
    let module = lower_main("bool", vec![ret(bool_lit(true))]);
    assert!(ops(&module).contains(&IrOpcode::ReturnI32));
    assert_eq!(run(&module), 1);
}

#[test]
fn test_string_binding_and_print() {
    let module = lower_main(
        "int",
        vec![
            binding("s", &["string"], str_lit("hello")),
            call("print_line", vec![name("s")]),
            ret(lit32(0)),
        ],
    );
    assert_eq!(module.string_table, vec!["hello".to_string()]);
    let print = module.functions[0]
        .instructions
        .iter()
        .find(|inst| inst.op == IrOpcode::PrintString)
        .unwrap();
    assert_eq!(print_string_index(print.imm), 0);
    assert_eq!(print_flags(print.imm), PRINT_FLAG_NEWLINE);
}

#[test]
fn test_print_error_targets_stderr() {
    let module = lower_main(
        "int",
        vec![call("print_error", vec![str_lit("oops")]), ret(lit32(0))],
    );
    let print = module.functions[0]
        .instructions
        .iter()
        .find(|inst| inst.op == IrOpcode::PrintString)
        .unwrap();
    assert_eq!(print_flags(print.imm), PRINT_FLAG_STDERR);
}

#[test]
fn test_print_numeric_selects_width() {
    let module = lower_main(
        "int",
        vec![
            call("print", vec![lit32(1)]),
            call("print", vec![lit64(2)]),
            call("print", vec![litu64(3)]),
            ret(lit32(0)),
        ],
    );
    let emitted = ops(&module);
    assert!(emitted.contains(&IrOpcode::PrintI32));
    assert!(emitted.contains(&IrOpcode::PrintI64));
    assert!(emitted.contains(&IrOpcode::PrintU64));
}

#[test]
fn test_string_literals_are_interned_once() {
    let module = lower_main(
        "int",
        vec![
            call("print", vec![str_lit("same")]),
            call("print", vec![str_lit("same")]),
            ret(lit32(0)),
        ],
    );
    assert_eq!(module.string_table, vec!["same".to_string()]);
}

#[test]
fn test_string_byte_access_emits_load_string_byte() {
    let module = lower_main(
        "int",
        vec![
            binding("s", &["string"], str_lit("abc")),
            ret(call("at_unsafe", vec![name("s"), lit32(1)])),
        ],
    );
    let load = module.functions[0]
        .instructions
        .iter()
        .find(|inst| inst.op == IrOpcode::LoadStringByte)
        .unwrap();
    assert_eq!(load.imm, 0);
}

#[test]
fn test_string_byte_access_checked_bounds_use_length() {
    let module = lower_main(
        "int",
        vec![
            binding("s", &["string"], str_lit("abc")),
            ret(call("at", vec![name("s"), lit32(1)])),
        ],
    );
    // The upper bound compares against the interned byte length.
    let instructions = &module.functions[0].instructions;
    assert!(instructions
        .iter()
        .any(|inst| inst.op == IrOpcode::PushI32 && inst.imm == 3));
    assert!(instructions.iter().any(|inst| inst.op == IrOpcode::LoadStringByte));
    assert!(module
        .string_table
        .contains(&"array index out of bounds".to_string()));
}

mod entry_args {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args_param() -> crate::ast::Expr {
        param("args", &["array<string>"], None)
    }

    #[test]
    fn test_count_lowers_to_push_argc() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param()],
            vec![ret(call("count", vec![name("args")]))],
        )]);
        let module = lower(&program, "/main").unwrap();
        assert!(ops(&module).contains(&IrOpcode::PushArgc));
    }

    #[test]
    fn test_print_at_emits_bounds_checks_and_print_argv() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param()],
            vec![
                call("print_line", vec![call("at", vec![name("args"), lit32(0)])]),
                ret(lit32(0)),
            ],
        )]);
        let module = lower(&program, "/main").unwrap();
        let emitted = ops(&module);
        assert!(emitted.contains(&IrOpcode::PrintArgv));
        assert!(emitted.contains(&IrOpcode::PushArgc));
        assert!(emitted.contains(&IrOpcode::PrintString));
        assert!(module
            .string_table
            .contains(&"array index out of bounds".to_string()));
    }

    #[test]
    fn test_print_at_unsafe_emits_unchecked_print_argv() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param()],
            vec![
                call(
                    "print",
                    vec![call("at_unsafe", vec![name("args"), lit32(1)])],
                ),
                ret(lit32(0)),
            ],
        )]);
        let module = lower(&program, "/main").unwrap();
        let emitted = ops(&module);
        assert!(emitted.contains(&IrOpcode::PrintArgvUnsafe));
        assert!(!emitted.contains(&IrOpcode::PrintString));
    }

    #[test]
    fn test_string_binding_from_argv() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param()],
            vec![
                binding(
                    "first",
                    &["string"],
                    call("at_unsafe", vec![name("args"), lit32(1)]),
                ),
                call("print_line", vec![name("first")]),
                ret(lit32(0)),
            ],
        )]);
        let module = lower(&program, "/main").unwrap();
        assert!(ops(&module).contains(&IrOpcode::PrintArgv));
    }

    #[test]
    fn test_shadowed_entry_args_name_is_a_plain_local() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param()],
            vec![
                binding("args", &["i32"], lit32(5)),
                ret(call("count", vec![name("args")])),
            ],
        )]);
        // count() now sees an ordinary local, not the entry args.
        let module = lower(&program, "/main").unwrap();
        assert!(!ops(&module).contains(&IrOpcode::PushArgc));
    }

    #[test]
    fn test_two_parameters_rejected() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![args_param(), args_param()],
            vec![ret(lit32(0))],
        )]);
        assert_eq!(
            lower(&program, "/main").unwrap_err(),
            LowerError::EntryParameterCount
        );
    }

    #[test]
    fn test_non_array_string_parameter_rejected() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![param("args", &["array<i32>"], None)],
            vec![ret(lit32(0))],
        )]);
        assert_eq!(
            lower(&program, "/main").unwrap_err(),
            LowerError::EntryParameterType
        );
    }

    #[test]
    fn test_parameter_default_rejected() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![param("args", &["array<string>"], Some(lit32(0)))],
            vec![ret(lit32(0))],
        )]);
        assert_eq!(
            lower(&program, "/main").unwrap_err(),
            LowerError::EntryParameterDefault
        );
    }
}

mod errors {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_entry_definition() {
        let err = lower(&program(vec![]), "/main").unwrap_err();
        assert_eq!(err, LowerError::MissingEntry("/main".to_string()));
        assert_eq!(
            err.to_string(),
            "native backend requires entry definition /main"
        );
    }

    #[test]
    fn test_float_binding_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![binding("f", &["f32"], lit32(0)), ret(lit32(0))],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::FloatUnsupported);
    }

    #[test]
    fn test_float_literal_rejected() {
        let mut float = crate::ast::Expr::new(ExprKind::FloatLiteral {
            text: "1.5".to_string(),
            width: 32,
        });
        float.name = String::new();
        let err = lower(&main_program("int", vec![ret(float)]), "/main").unwrap_err();
        assert_eq!(err, LowerError::FloatLiteral);
    }

    #[test]
    fn test_string_pointer_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("s", &["Pointer<string>"], str_lit("x")),
                    ret(lit32(0)),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::StringPointer);
    }

    #[test]
    fn test_missing_return_rejected() {
        let err = lower(
            &program(vec![def("/main", &["return<int>"], vec![], vec![])]),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::MissingReturn);
        assert_eq!(
            err.to_string(),
            "native backend requires an explicit return statement"
        );
    }

    #[test]
    fn test_i32_literal_out_of_range() {
        let err = lower(
            &main_program("int", vec![ret(lit32(1_i64 << 33))]),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::LiteralOutOfRange);
    }

    #[test]
    fn test_assign_to_immutable_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("v", &["i32"], lit32(1)),
                    call("assign", vec![name("v"), lit32(2)]),
                    ret(name("v")),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::AssignTargetNotMutable("v".to_string()));
        assert_eq!(err.to_string(), "assign target must be mutable: v");
    }

    #[test]
    fn test_reference_requires_location_initializer() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("r", &["Reference<i32>"], lit32(5)),
                    ret(lit32(0)),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::ReferenceInitializer);
    }

    #[test]
    fn test_binding_redefinition_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("v", &["i32"], lit32(1)),
                    binding("v", &["i32"], lit32(2)),
                    ret(lit32(0)),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::BindingRedefinesName("v".to_string()));
    }

    #[test]
    fn test_block_scoped_binding_can_reuse_name() {
        let module = lower_main(
            "int",
            vec![
                if_stmt(
                    bool_lit(true),
                    vec![binding("v", &["i32"], lit32(1))],
                    vec![binding("v", &["i32"], lit32(2))],
                ),
                binding("v", &["i32"], lit32(3)),
                ret(name("v")),
            ],
        );
        assert_eq!(super::run(&module), 3);
    }

    #[test]
    fn test_pointer_on_right_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("v", &["i32", "mut"], lit32(1)),
                    binding("p", &["Pointer<i32>"], call("location", vec![name("v")])),
                    ret(call("plus", vec![lit32(1), name("p")])),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::PointerOnRight);
    }

    #[test]
    fn test_pointer_plus_pointer_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("v", &["i32", "mut"], lit32(1)),
                    binding("p", &["Pointer<i32>"], call("location", vec![name("v")])),
                    ret(call("plus", vec![name("p"), name("p")])),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::PointerPlusPointer);
    }

    #[test]
    fn test_mixed_sign_arithmetic_rejected() {
        let err = lower(
            &main_program("int", vec![ret(call("plus", vec![litu64(1), lit32(2)]))]),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::OperandTypes("plus".to_string()));
    }

    #[test]
    fn test_negate_unsigned_rejected() {
        let err = lower(
            &main_program("int", vec![ret(call("negate", vec![litu64(1)]))]),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::NegateUnsigned);
    }

    #[test]
    fn test_clamp_mixed_signedness_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![ret(call("clamp", vec![lit32(1), litu64(0), lit32(5)]))],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::ClampArguments);
    }

    #[test]
    fn test_duplicate_return_annotations_conflict() {
        let entry = def(
            "/main",
            &["return<int>", "return<i64>"],
            vec![],
            vec![ret(lit32(0))],
        );
        let err = lower(&program(vec![entry]), "/main").unwrap_err();
        assert_eq!(err, LowerError::ConflictingReturnTypes("/main".to_string()));
    }

    #[test]
    fn test_conflicting_inferred_returns() {
        let helper = def(
            "/mixed",
            &[],
            vec![param("flag", &["bool"], None)],
            vec![
                if_stmt(name("flag"), vec![ret(lit32(1))], vec![ret(lit64(2))]),
                ret(lit32(0)),
            ],
        );
        let main = def(
            "/main",
            &["return<int>"],
            vec![],
            vec![ret(call("/mixed", vec![bool_lit(true)]))],
        );
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::ConflictingReturnTypes("/mixed".to_string()));
    }

    #[test]
    fn test_mutual_recursion_requires_annotation() {
        let a = def("/a", &[], vec![], vec![ret(call("/b", vec![]))]);
        let b = def("/b", &[], vec![], vec![ret(call("/a", vec![]))]);
        let main = def(
            "/main",
            &["return<int>"],
            vec![],
            vec![ret(call("/a", vec![]))],
        );
        let err = lower(&program(vec![main, a, b]), "/main").unwrap_err();
        assert!(matches!(err, LowerError::RecursiveInference(_)));
    }

    #[test]
    fn test_string_return_rejected() {
        let helper = def(
            "/text",
            &["return<string>"],
            vec![],
            vec![ret(str_lit("x"))],
        );
        let main = def(
            "/main",
            &["return<int>"],
            vec![],
            vec![call("/text", vec![]), ret(lit32(0))],
        );
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::StringReturn("/text".to_string()));
    }

    #[test]
    fn test_block_arguments_on_user_call_rejected() {
        let helper = def("/h", &["return<int>"], vec![], vec![ret(lit32(1))]);
        let mut call_expr = call("/h", vec![]);
        call_expr.body_arguments.push(ret(lit32(2)));
        let main = def("/main", &["return<int>"], vec![], vec![ret(call_expr)]);
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::CallBlockArguments);
    }

    #[test]
    fn test_map_literal_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![
                    binding("m", &["map<i32>"], call_t("map", &["i32"], vec![])),
                    ret(lit32(0)),
                ],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::CollectionLiteral("map".to_string()));
    }

    #[test]
    fn test_print_in_expression_rejected() {
        let err = lower(
            &main_program("int", vec![ret(call("print", vec![lit32(1)]))]),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::PrintInExpression("print".to_string()));
    }

    #[test]
    fn test_print_two_arguments_rejected() {
        let err = lower(
            &main_program(
                "int",
                vec![call("print", vec![lit32(1), lit32(2)]), ret(lit32(0))],
            ),
            "/main",
        )
        .unwrap_err();
        assert_eq!(err, LowerError::OneArgument("print".to_string()));
    }

    #[test]
    fn test_unknown_identifier() {
        let err = lower(&main_program("int", vec![ret(name("ghost"))]), "/main").unwrap_err();
        assert_eq!(err, LowerError::UnknownIdentifier("ghost".to_string()));
        assert_eq!(
            err.to_string(),
            "native backend does not know identifier: ghost"
        );
    }

    #[test]
    fn test_unknown_named_argument() {
        let helper = def(
            "/h",
            &["return<int>"],
            vec![param("a", &["i32"], None)],
            vec![ret(name("a"))],
        );
        let mut call_expr = call("/h", vec![lit32(1)]);
        call_expr.arg_names = vec![Some("zzz".to_string())];
        let main = def("/main", &["return<int>"], vec![], vec![ret(call_expr)]);
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::UnknownNamedArgument("zzz".to_string()));
    }

    #[test]
    fn test_duplicate_named_argument() {
        let helper = def(
            "/h",
            &["return<int>"],
            vec![param("a", &["i32"], None)],
            vec![ret(name("a"))],
        );
        let mut call_expr = call("/h", vec![lit32(1), lit32(2)]);
        call_expr.arg_names = vec![None, Some("a".to_string())];
        let main = def("/main", &["return<int>"], vec![], vec![ret(call_expr)]);
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::DuplicateNamedArgument("a".to_string()));
    }

    #[test]
    fn test_missing_argument_without_default() {
        let helper = def(
            "/h",
            &["return<int>"],
            vec![param("a", &["i32"], None)],
            vec![ret(name("a"))],
        );
        let main = def(
            "/main",
            &["return<int>"],
            vec![],
            vec![ret(call("/h", vec![]))],
        );
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::ArgumentCountMismatch);
    }

    #[test]
    fn test_void_call_in_expression_rejected() {
        let helper = def("/v", &["return<void>"], vec![], vec![]);
        let main = def(
            "/main",
            &["return<int>"],
            vec![],
            vec![ret(call("/v", vec![]))],
        );
        let err = lower(&program(vec![main, helper]), "/main").unwrap_err();
        assert_eq!(err, LowerError::VoidCallInExpression("/v".to_string()));
    }

    #[test]
    fn test_argv_byte_access_rejected() {
        let program = program(vec![def(
            "/main",
            &["return<int>"],
            vec![param("args", &["array<string>"], None)],
            vec![
                binding(
                    "s",
                    &["string"],
                    call("at_unsafe", vec![name("args"), lit32(0)]),
                ),
                ret(call("at", vec![name("s"), lit32(0)])),
            ],
        )]);
        let err = lower(&program, "/main").unwrap_err();
        assert_eq!(err, LowerError::StringByteSource);
    }
}
