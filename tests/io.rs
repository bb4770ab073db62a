mod common;

use common::{compile_error, gen_ir_for_source};

#[test]
fn fprint_calls_printf_with_the_format_literal() {
    let ir = gen_ir_for_source("(fprint \"value: %d\\n\" 7)").unwrap();
    assert!(
        ir.contains("declare i32 @printf(ptr, ...)"),
        "missing printf declaration:\n{ir}"
    );
    assert!(ir.contains("value: %d"), "missing format literal:\n{ir}");
    assert!(ir.contains("i64 7"), "missing argument:\n{ir}");
}

#[test]
fn fprint_result_is_widened_to_i64() {
    let ir = gen_ir_for_source("(var r (fprint \"x\"))").unwrap();
    assert!(
        ir.contains("sext i32") || ir.contains("print.result"),
        "printf result must widen:\n{ir}"
    );
}

#[test]
fn fprint_requires_a_literal_format() {
    let msg = compile_error("(do (var f \"x\") (fprint f))");
    assert!(
        msg.contains("must be a format string"),
        "unexpected message: {msg}"
    );
}

#[test]
fn escape_sequences_reach_the_format_global() {
    let ir = gen_ir_for_source("(fprint \"a\\tb\\n\")").unwrap();
    assert!(
        ir.contains("a\\09b\\0A"),
        "tab and newline must be processed:\n{ir}"
    );
}

#[test]
fn prompt_only_finput_reads_a_line() {
    let ir = gen_ir_for_source("(var s (finput \"name: \"))").unwrap();
    assert!(ir.contains("@fgets"), "missing fgets call:\n{ir}");
    assert!(ir.contains("@stdin"), "missing stdin global:\n{ir}");
    assert!(ir.contains("input_buffer"), "missing stack buffer:\n{ir}");
    assert!(ir.contains("Input error"), "missing failure message:\n{ir}");
    assert!(ir.contains("@strlen"), "newline trim measures the line:\n{ir}");
}

#[test]
fn formatted_finput_scans_into_existing_variables() {
    let ir = gen_ir_for_source("(do (var x 0) (finput \"x? \" x))").unwrap();
    assert!(ir.contains("@scanf"), "missing scanf call:\n{ir}");
    assert!(ir.contains("@fflush"), "prompt must be flushed:\n{ir}");
    assert!(
        ir.contains("Input format error. Expected %d values, got %d"),
        "missing mismatch report:\n{ir}"
    );
}

#[test]
fn scan_format_is_built_from_target_types() {
    let ir =
        gen_ir_for_source("(do (var i 0) (var d 0.5) (finput \"go: \" i d))").unwrap();
    assert!(
        ir.contains("c\"%d%lf\\00\""),
        "conversions concatenate per target:\n{ir}"
    );
}

#[test]
fn string_targets_are_copied_to_the_heap() {
    let ir = gen_ir_for_source("(do (var s \"\") (finput \"s? \" s))").unwrap();
    assert!(ir.contains("%255s"), "string conversion is bounded:\n{ir}");
    assert!(ir.contains("@malloc"), "scanned string moves to heap:\n{ir}");
    assert!(ir.contains("@strcpy"), "scanned string is copied:\n{ir}");
}

#[test]
fn typed_markers_and_pairs_make_fresh_targets() {
    let src = "(do (var r (finput \"vals: \" (a !int) !double)) (fprint \"%d\\n\" a))";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("c\"%d%lf\\00\""),
        "pair and marker contribute conversions:\n{ir}"
    );
}

#[test]
fn single_target_yields_the_read_value() {
    let ir = gen_ir_for_source("(do (var x 0) (var got (finput \"x? \" x)))").unwrap();
    assert!(ir.contains("input_value"), "single read loads the value:\n{ir}");
}

#[test]
fn finput_rejects_struct_targets() {
    let src = "(struct Pt ((x !int))) (var p (new Pt (x 1))) (finput \"p? \" p)";
    let msg = compile_error(src);
    assert!(
        msg.contains("Cannot read directly into struct"),
        "unexpected message: {msg}"
    );
}

#[test]
fn finput_rejects_unknown_variables() {
    let msg = compile_error("(finput \"x? \" nowhere)");
    assert!(
        msg.contains("Variable not found for finput: nowhere"),
        "unexpected message: {msg}"
    );
}

#[test]
fn mismatch_path_drains_the_input_line() {
    let ir = gen_ir_for_source("(do (var x 0) (finput \"x? \" x))").unwrap();
    assert!(
        ir.contains("%*[^\\0A]"),
        "mismatch path must discard the rest of the line:\n{ir}"
    );
}
