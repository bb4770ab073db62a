mod common;

use common::{compile_error, gen_ir_for_source};

const PT: &str = "(struct Pt ((x !int) (y !int)))";

#[test]
fn struct_definition_registers_an_aggregate() {
    let src = format!("{PT} (var p (new Pt (x 1) (y 2)))");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(
        ir.contains("%Pt = type { i64, i64 }"),
        "missing aggregate layout:\n{ir}"
    );
    assert!(ir.contains("alloca %Pt"), "instance lives on the stack:\n{ir}");
    assert!(
        ir.contains("store %Pt zeroinitializer"),
        "instance must be zero-initialized:\n{ir}"
    );
}

#[test]
fn getprop_loads_through_field_addresses() {
    let src = format!(
        "{PT} (var p (new Pt (x 1) (y 2))) (fprint \"%d %d\\n\" (getprop p x) (getprop p y))"
    );
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(
        ir.contains("getelementptr inbounds %Pt"),
        "missing field address computation:\n{ir}"
    );
    assert!(ir.contains("@printf"), "missing print:\n{ir}");
}

#[test]
fn setprop_coerces_and_stores() {
    let src = format!("{PT} (var v 2.5) (var p (new Pt (x 1) (y 2))) (setprop p x v)");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(ir.contains("fptosi"), "double value must become int:\n{ir}");
}

#[test]
fn hasprop_is_a_compile_time_answer() {
    let src = format!("{PT} (var p (new Pt (x 1) (y 2))) (var h (hasprop p x))");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(ir.contains("store i1 true"), "x is a field of Pt:\n{ir}");

    let src = format!("{PT} (var p (new Pt (x 1) (y 2))) (var h (hasprop p z))");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(ir.contains("store i1 false"), "z is not a field of Pt:\n{ir}");
}

#[test]
fn hasprop_on_a_non_struct_is_false_not_an_error() {
    let ir = gen_ir_for_source("(do (var n 5) (var h (hasprop n x)))").unwrap();
    assert!(ir.contains("store i1 false"), "non-struct subject is false:\n{ir}");
}

#[test]
fn getprop_of_unknown_field_is_fatal() {
    let src = format!("{PT} (var p (new Pt (x 1) (y 2))) (getprop p z)");
    let msg = compile_error(&src);
    assert!(
        msg.contains("has no field named z"),
        "unexpected message: {msg}"
    );
}

#[test]
fn new_rejects_duplicate_field_assignments() {
    let src = format!("{PT} (var p (new Pt (x 1) (x 2)))");
    let msg = compile_error(&src);
    assert!(
        msg.contains("Duplicate field assignment"),
        "unexpected message: {msg}"
    );
}

#[test]
fn new_rejects_unknown_fields_and_structs() {
    let src = format!("{PT} (new Pt (z 1))");
    let msg = compile_error(&src);
    assert!(msg.contains("has no field named z"), "unexpected message: {msg}");

    let msg = compile_error("(new Missing (x 1))");
    assert!(
        msg.contains("Unknown struct type: Missing"),
        "unexpected message: {msg}"
    );
}

#[test]
fn struct_redefinition_is_a_silent_no_op() {
    let src = format!("{PT} {PT} (var p (new Pt (x 1) (y 2)))");
    assert!(gen_ir_for_source(&src).is_ok());
}

#[test]
fn struct_alloc_allocates_without_initializers() {
    let src = format!("{PT} (var p (struct-alloc Pt)) (setprop p x 3)");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(ir.contains("alloca %Pt"), "missing allocation:\n{ir}");
    assert!(
        ir.contains("store %Pt zeroinitializer"),
        "missing zero store:\n{ir}"
    );
}

#[test]
fn struct_fields_can_coerce_on_new() {
    let src = format!("{PT} (var v 2.5) (var p (new Pt (x v) (y 2)))");
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(ir.contains("fptosi"), "field store must coerce:\n{ir}");
}

#[test]
fn structs_pass_to_functions_as_pointers() {
    let src = format!(
        "{PT} \
         (defn (getx !int) ((p !Pt)) (getprop p x)) \
         (var q (new Pt (x 7) (y 8))) \
         (fprint \"%d\\n\" (getx q))"
    );
    let ir = gen_ir_for_source(&src).unwrap();
    assert!(
        ir.contains("define i64 @getx(ptr"),
        "struct parameter is a pointer:\n{ir}"
    );
}
