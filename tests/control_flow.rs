mod common;

use common::{compile_error, gen_ir_for_source};

#[test]
fn if_with_else_builds_three_blocks_and_a_phi() {
    let ir = gen_ir_for_source("(do (var x 1) (var y (if (> x 0) 10 20)))").unwrap();
    assert!(ir.contains("if.then:"), "missing then block:\n{ir}");
    assert!(ir.contains("if.else:"), "missing else block:\n{ir}");
    assert!(ir.contains("if.end:"), "missing merge block:\n{ir}");
    assert!(ir.contains("phi i64"), "missing merge phi:\n{ir}");
}

#[test]
fn if_without_else_has_no_else_block() {
    let ir = gen_ir_for_source("(do (var x 1) (if (> x 0) (set x 2)))").unwrap();
    assert!(ir.contains("if.then:"), "missing then block:\n{ir}");
    assert!(!ir.contains("if.else:"), "unexpected else block:\n{ir}");
}

#[test]
fn non_boolean_condition_is_compared_against_zero() {
    let ir = gen_ir_for_source("(do (var x 5) (if x (set x 0)))").unwrap();
    assert!(ir.contains("icmp ne"), "expected zero test:\n{ir}");
}

#[test]
fn while_lowers_to_cond_body_exit() {
    let src = "(do (var i 0) (while (< i 3) (do (fprint \"%d \" i) (set i (+ i 1)))))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("while.cond:"), "missing condition block:\n{ir}");
    assert!(ir.contains("while.body:"), "missing body block:\n{ir}");
    assert!(ir.contains("while.end:"), "missing exit block:\n{ir}");
    assert!(
        ir.contains("br label %while.cond"),
        "body must fall back to the condition:\n{ir}"
    );
}

#[test]
fn while_false_still_emits_a_well_formed_loop() {
    let ir = gen_ir_for_source("(while false (fprint \"unreachable\"))").unwrap();
    assert!(ir.contains("while.cond:"), "missing condition block:\n{ir}");
    assert!(ir.contains("while.end:"), "missing exit block:\n{ir}");
}

#[test]
fn break_branches_to_the_loop_exit() {
    let src = "(do (var i 0) (while true (do (set i (+ i 1)) (if (> i 3) (break)))))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("br label %while.end"),
        "break must target the exit block:\n{ir}"
    );
}

#[test]
fn continue_branches_to_the_condition() {
    let src = "(do (var i 0) (while (< i 3) (do (set i (+ i 1)) (continue))))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("continue.cont"), "missing continuation block:\n{ir}");
}

#[test]
fn break_outside_loop_is_fatal() {
    let msg = compile_error("(break)");
    assert!(
        msg.contains("break statement outside loop"),
        "unexpected message: {msg}"
    );
}

#[test]
fn continue_outside_loop_is_fatal() {
    let msg = compile_error("(do (var x 1) (continue))");
    assert!(
        msg.contains("continue statement outside loop"),
        "unexpected message: {msg}"
    );
}

#[test]
fn nested_loops_compile() {
    let src = "(do \
        (var i 0) \
        (while (< i 2) (do \
            (var j 0) \
            (while (< j 2) (do \
                (if (== j 1) (break)) \
                (set j (+ j 1)))) \
            (set i (+ i 1)))))";
    assert!(gen_ir_for_source(src).is_ok());
}

#[test]
fn if_arms_scope_their_bindings() {
    let msg = compile_error("(do (var c 1) (if c (var t 1)) (fprint \"%d\" t))");
    assert!(msg.contains("Undefined symbol: t"), "unexpected message: {msg}");
}
