mod common;

use common::{compile_error, gen_ir_for_source};

#[test]
fn unit_defines_main_returning_zero() {
    let ir = gen_ir_for_source("(fprint \"%d\\n\" (+ 2 3))").unwrap();
    assert!(ir.contains("define i32 @main()"), "missing main:\n{ir}");
    assert!(ir.contains("ret i32 0"), "main must return 0:\n{ir}");
    assert!(ir.contains("@_GALLUZ_LLVM_VERSION"), "missing version global:\n{ir}");
}

#[test]
fn print_of_constant_sum_folds_to_five() {
    // (+ 2 3) is constant-folded by the builder; printf still gets the
    // format string and the value
    let ir = gen_ir_for_source("(fprint \"%d\\n\" (+ 2 3))").unwrap();
    assert!(ir.contains("@printf"), "missing printf call:\n{ir}");
    assert!(ir.contains("i64 5"), "expected folded constant 5:\n{ir}");
}

#[test]
fn integer_arithmetic_uses_integer_ops() {
    let ir = gen_ir_for_source("(do (var x 10) (var y (/ x 3)) (var z (% x 3)))").unwrap();
    assert!(ir.contains("sdiv"), "expected signed division:\n{ir}");
    assert!(ir.contains("srem"), "expected signed remainder:\n{ir}");
}

#[test]
fn mixed_arithmetic_promotes_to_double() {
    let ir = gen_ir_for_source("(do (var x 1) (var y (+ x 2.5)))").unwrap();
    assert!(ir.contains("sitofp"), "expected int-to-double promotion:\n{ir}");
    assert!(ir.contains("fadd"), "expected floating add:\n{ir}");
}

#[test]
fn float_modulo_is_fatal() {
    let msg = compile_error("(% 1.5 2.0)");
    assert!(msg.contains("Modulo"), "unexpected message: {msg}");
}

#[test]
fn comparison_results_are_lifted_to_i64() {
    let ir = gen_ir_for_source("(do (var a 1) (var c (< a 2)))").unwrap();
    assert!(ir.contains("icmp slt"), "expected signed compare:\n{ir}");
    assert!(ir.contains("zext i1"), "expected zext to i64:\n{ir}");
}

#[test]
fn mixed_comparison_uses_ordered_float_predicates() {
    let ir = gen_ir_for_source("(do (var a 1) (var c (>= a 1.5)))").unwrap();
    assert!(ir.contains("fcmp oge"), "expected ordered compare:\n{ir}");
}

#[test]
fn do_block_mutation_and_print() {
    let ir =
        gen_ir_for_source("(do (var x 10) (set x (+ x 1)) (fprint \"%d\\n\" x))").unwrap();
    assert!(ir.contains("alloca i64"), "x needs stack storage:\n{ir}");
    assert!(ir.contains("add"), "expected increment:\n{ir}");
    assert!(ir.contains("@printf"), "expected print call:\n{ir}");
}

#[test]
fn names_do_not_escape_their_block() {
    let msg = compile_error("(do (scope (var x 1)) (fprint \"%d\" x))");
    assert!(msg.contains("Undefined symbol: x"), "unexpected message: {msg}");
}

#[test]
fn inner_shadowing_restores_outer_binding() {
    // The inner x is a double; after the scope exits, x is an int again
    let ir =
        gen_ir_for_source("(do (var x 1) (scope (var x 2.5) (set x 3.5)) (set x 2))").unwrap();
    assert!(ir.contains("store double"), "inner binding is a double:\n{ir}");
    assert!(ir.contains("store i64 2"), "outer binding stays int:\n{ir}");
}

#[test]
fn identical_string_literals_share_one_global() {
    let ir = gen_ir_for_source("(do (fprint \"hi\") (fprint \"hi\"))").unwrap();
    assert_eq!(
        ir.matches("c\"hi\\00\"").count(),
        1,
        "literal should be interned once:\n{ir}"
    );
}

#[test]
fn bool_literals_are_i1() {
    let ir = gen_ir_for_source("(var b true)").unwrap();
    assert!(ir.contains("alloca i1"), "bool local is i1:\n{ir}");
}

#[test]
fn annotated_declaration_coerces_initializer() {
    let ir = gen_ir_for_source("(var (x !double) 1)").unwrap();
    assert!(
        ir.contains("store double"),
        "int initializer must become a double:\n{ir}"
    );
}

#[test]
fn unknown_annotation_is_fatal() {
    let msg = compile_error("(var (x !quux) 1)");
    assert!(msg.contains("unknown type"), "unexpected message: {msg}");
}

#[test]
fn globals_live_at_module_level() {
    let ir = gen_ir_for_source("(do (global g 5) (set g 7))").unwrap();
    assert!(ir.contains("@g = global i64 5"), "missing global:\n{ir}");
    assert!(ir.contains("store i64 7, ptr @g"), "missing store:\n{ir}");
}

#[test]
fn global_initializer_must_be_constant() {
    let msg = compile_error("(do (var x 1) (global g (+ x 1)))");
    assert!(msg.contains("must be constant"), "unexpected message: {msg}");
}

#[test]
fn global_redeclaration_same_type_is_allowed() {
    assert!(gen_ir_for_source("(do (global g 5) (global g 6))").is_ok());
}

#[test]
fn global_redeclaration_with_new_type_is_fatal() {
    let msg = compile_error("(do (global g 5) (global g 1.5))");
    assert!(msg.contains("different type"), "unexpected message: {msg}");
}

#[test]
fn set_of_unknown_name_is_fatal() {
    let msg = compile_error("(set nope 1)");
    assert!(
        msg.contains("Cannot set undefined variable: nope"),
        "unexpected message: {msg}"
    );
}

#[test]
fn unbalanced_program_is_rejected_before_parsing() {
    let msg = compile_error("(var x 1");
    assert!(msg.contains("Unbalanced"), "unexpected message: {msg}");
}

#[test]
fn comments_are_stripped_before_parsing() {
    let src = "// leading\n(do (var x 1) /* inline */ (set x 2))\n";
    assert!(gen_ir_for_source(src).is_ok());
}
