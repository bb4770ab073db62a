mod common;

use common::{compile_error, gen_ir_for_source};

#[test]
fn defn_and_call() {
    let src = "(defn (sum !int) ((a !int) (b !int)) (+ a b)) (fprint \"%d\\n\" (sum 2 3))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("define i64 @sum"), "missing definition:\n{ir}");
    assert!(ir.contains("call i64 @sum"), "missing call:\n{ir}");
}

#[test]
fn parameters_get_stack_slots() {
    let ir =
        gen_ir_for_source("(defn (id !int) ((a !int)) a)").unwrap();
    assert!(ir.contains("alloca i64"), "parameter needs a slot:\n{ir}");
    assert!(ir.contains("ret i64"), "missing return:\n{ir}");
}

#[test]
fn self_recursion_resolves() {
    let src = "(defn (fact !int) ((n !int)) \
        (if (<= n 1) 1 (* n (fact (- n 1))))) \
        (fprint \"%d\\n\" (fact 5))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.matches("call i64 @fact").count() >= 2,
        "expected recursive and top-level calls:\n{ir}"
    );
}

#[test]
fn argument_count_must_match() {
    let src = "(defn (sum !int) ((a !int) (b !int)) (+ a b)) (sum 1)";
    let msg = compile_error(src);
    assert!(
        msg.contains("expects 2 arguments, got 1"),
        "unexpected message: {msg}"
    );
}

#[test]
fn arguments_coerce_to_parameter_types() {
    let src = "(defn (half !double) ((x !double)) (/ x 2.0)) (half 3)";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("call double @half(double"),
        "int argument must arrive as a double:\n{ir}"
    );
}

#[test]
fn body_result_coerces_to_return_type() {
    let src = "(defn (trunc !int) ((x !double)) x)";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("fptosi"), "double body must become int:\n{ir}");
}

#[test]
fn void_functions_return_void() {
    let src = "(defn (show !void) ((x !int)) (fprint \"%d\\n\" x)) (show 3)";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("define void @show"), "missing definition:\n{ir}");
    assert!(ir.contains("ret void"), "missing void return:\n{ir}");
}

#[test]
fn calling_an_unknown_function_is_fatal() {
    let msg = compile_error("(nosuch 1 2)");
    assert!(
        msg.contains("Undefined function: nosuch"),
        "unexpected message: {msg}"
    );
}

#[test]
fn functions_remain_visible_after_definition_scope() {
    // defn binds in the enclosing frame, so a later sibling sees it
    let src = "(do (defn (one !int) () 1) (fprint \"%d\" (one)))";
    assert!(gen_ir_for_source(src).is_ok());
}

#[test]
fn malformed_signature_is_fatal() {
    let msg = compile_error("(defn sum ((a !int)) a)");
    assert!(
        msg.contains("Invalid function name format"),
        "unexpected message: {msg}"
    );
}

#[test]
fn unknown_parameter_type_is_fatal() {
    let msg = compile_error("(defn (f !int) ((a !wat)) a)");
    assert!(
        msg.contains("Unknown parameter type"),
        "unexpected message: {msg}"
    );
}
