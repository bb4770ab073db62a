mod common;

use common::{compile_error_in_dir, gen_ir_in_dir, module_dir};

const LIB: &str = "(defmodule M (defn (answer !int) () 42))";

#[test]
fn import_materializes_module_functions() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let src = "(import \"lib.glz\" (module M)) (fprint \"%d\\n\" (M.answer))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert!(ir.contains("define i64 @answer"), "missing function:\n{ir}");
    assert!(ir.contains("call i64 @answer"), "missing call:\n{ir}");
}

#[test]
fn import_appends_glz_extension() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let src = "(import \"lib\" (module M)) (fprint \"%d\\n\" (M.answer))";
    assert!(gen_ir_in_dir(src, dir.path()).is_ok());
}

#[test]
fn module_call_form_resolves_exported_symbols() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let src = "(import \"lib.glz\" (module M)) (fprint \"%d\\n\" (M answer))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert!(ir.contains("call i64 @answer"), "missing call:\n{ir}");
}

#[test]
fn empty_module_list_registers_everything_in_the_file() {
    let two = "(defmodule A (defn (one !int) () 1)) (defmodule B (defn (two !int) () 2))";
    let dir = module_dir(&[("both.glz", two)]).unwrap();
    let src = "(import \"both.glz\") (fprint \"%d %d\\n\" (A.one) (B.two))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert!(ir.contains("define i64 @one"), "missing A.one:\n{ir}");
    assert!(ir.contains("define i64 @two"), "missing B.two:\n{ir}");
}

#[test]
fn reimport_of_a_loaded_file_is_a_no_op() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let src = "(import \"lib.glz\" (module M)) \
               (import \"lib.glz\" (module M)) \
               (fprint \"%d\\n\" (M.answer))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert_eq!(
        ir.matches("define i64 @answer").count(),
        1,
        "module body must be lowered once:\n{ir}"
    );
}

#[test]
fn missing_requested_module_is_fatal() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let src = "(import \"lib.glz\" (module Nope))";
    let msg = compile_error_in_dir(src, dir.path());
    assert!(
        msg.contains("Module not found: Nope"),
        "unexpected message: {msg}"
    );
}

#[test]
fn missing_file_is_fatal() {
    let dir = module_dir(&[]).unwrap();
    let msg = compile_error_in_dir("(import \"ghost.glz\" (module M))", dir.path());
    assert!(
        msg.contains("Cannot open module file"),
        "unexpected message: {msg}"
    );
}

#[test]
fn duplicate_exports_across_modules_conflict() {
    let clash = "(defmodule A (defn (same !int) () 1)) (defmodule B (defn (same !int) () 2))";
    let dir = module_dir(&[("clash.glz", clash)]).unwrap();
    let msg = compile_error_in_dir("(import \"clash.glz\")", dir.path());
    assert!(msg.contains("Symbol conflict"), "unexpected message: {msg}");
}

#[test]
fn mutual_imports_are_broken_by_the_load_cache() {
    let a = "(defmodule A (import \"b.glz\" (module B)) (defn (fa !int) () 1))";
    let b = "(defmodule B (import \"a.glz\" (module A)) (defn (fb !int) () 2))";
    let dir = module_dir(&[("a.glz", a), ("b.glz", b)]).unwrap();
    let src = "(import \"a.glz\" (module A)) (fprint \"%d %d\\n\" (A.fa) (B.fb))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert!(ir.contains("define i64 @fa"), "missing A.fa:\n{ir}");
    assert!(ir.contains("define i64 @fb"), "missing B.fb:\n{ir}");
}

#[test]
fn inline_defmodule_registers_in_the_current_unit() {
    let dir = module_dir(&[]).unwrap();
    let src = "(defmodule Local (defn (one !int) () 1)) (fprint \"%d\\n\" (Local.one))";
    let ir = gen_ir_in_dir(src, dir.path()).unwrap();
    assert!(ir.contains("define i64 @one"), "missing function:\n{ir}");
}

#[test]
fn moduleuse_requires_a_loaded_module() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let ok = "(import \"lib.glz\" (module M)) (moduleuse M)";
    assert!(gen_ir_in_dir(ok, dir.path()).is_ok());

    let msg = compile_error_in_dir("(moduleuse Ghost)", dir.path());
    assert!(
        msg.contains("Module not found: Ghost"),
        "unexpected message: {msg}"
    );
}

#[test]
fn bad_module_specification_is_fatal() {
    let dir = module_dir(&[("lib.glz", LIB)]).unwrap();
    let msg = compile_error_in_dir("(import \"lib.glz\" (item M))", dir.path());
    assert!(
        msg.contains("must start with 'module'"),
        "unexpected message: {msg}"
    );
}
