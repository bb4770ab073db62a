//! Module forms: `defmodule`, `import`, `moduleuse`.
//!
//! `import` loads a `.glz` file through the module manager and
//! registers the requested modules (or all of them): each `defn` child
//! of a registered module is lowered, recorded under both its bare
//! name and `Module.name`, and export uniqueness is enforced across
//! modules. `defmodule` in the main unit registers an inline module
//! the same way. `moduleuse` snapshots a module's exported function
//! descriptors into its resolution table.

use crate::ast::Expr;
use crate::context::CodeGen;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::dispatch::{Dispatcher, Generator, Lowered};
use crate::parser;

/// Extracts the function name from a `(defn (name !Ret) …)` child.
fn defn_name(item: &Expr) -> Option<&str> {
    if !item.is_form("defn") {
        return None;
    }
    let items = item.as_list()?;
    if items.len() < 4 {
        return None;
    }
    let [name_exp, _ret] = items.get(1)?.as_list()? else {
        return None;
    };
    name_exp.as_symbol()
}

/// Lowers the children of a module form, recording and alias-binding
/// its `defn` exports.
fn lower_module_children<'ctx>(
    module_name: &str,
    children: &[Expr],
    cg: &CodeGen<'ctx>,
    dispatcher: &Dispatcher,
) -> DiagnosticResult<()> {
    for item in children {
        let exported = defn_name(item).map(str::to_string);

        if let Some(func_name) = &exported {
            let full_name = format!("{module_name}.{func_name}");
            let mut modules = cg.modules.borrow_mut();
            modules.record_export(module_name, func_name);
            modules.record_export(module_name, &full_name);
        }

        dispatcher.lower(item, cg)?;

        // Alias the freshly bound descriptor under its dotted name so
        // cross-module calls resolve without the suffix fallback.
        if let Some(func_name) = &exported {
            let full_name = format!("{module_name}.{func_name}");
            let info = cg.env.borrow().lookup_fn(func_name);
            if let Some(info) = info {
                cg.env.borrow_mut().bind_fn(&full_name, info.clone());
                cg.modules
                    .borrow_mut()
                    .set_module_fn(module_name, func_name, info);
            }
        }
    }

    cg.modules.borrow_mut().finish_exports(module_name)
}

/// Registers one loaded module: parses its stored `defmodule` text and
/// lowers the children. Already-used modules are skipped.
fn register_module<'ctx>(
    module_name: &str,
    cg: &CodeGen<'ctx>,
    dispatcher: &Dispatcher,
) -> DiagnosticResult<()> {
    let content = {
        let mut modules = cg.modules.borrow_mut();
        if modules.mark_used(module_name)? {
            return Ok(());
        }
        let content = modules
            .module_content(module_name)
            .ok_or_else(|| Diagnostic::error(format!("Module not found: {module_name}")))?;
        let file = modules
            .module_file(module_name)
            .ok_or_else(|| Diagnostic::error(format!("Module not found: {module_name}")))?;
        modules.push_loading(file);
        content
    };

    let result = (|| {
        let ast = parser::parse(&content)?;
        let Some(items) = ast.as_list() else {
            return Err(Diagnostic::error(format!(
                "malformed module body: {module_name}"
            )));
        };
        if !ast.is_form("defmodule")
            || items.get(1).and_then(Expr::as_symbol) != Some(module_name)
        {
            return Err(Diagnostic::error(format!(
                "malformed module body: {module_name}"
            )));
        }
        lower_module_children(module_name, &items[2..], cg, dispatcher)
    })();

    cg.modules.borrow_mut().pop_loading();
    result
}

pub struct ImportGenerator;

impl Generator for ImportGenerator {
    fn name(&self) -> &'static str {
        "import"
    }

    fn priority(&self) -> i32 {
        930
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("import")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Err(Diagnostic::error("import requires at least a file path"));
        }
        let Expr::Str(file_path) = &items[1] else {
            return Err(Diagnostic::error("File path must be a string"));
        };

        let mut requested = Vec::new();
        for module_exp in &items[2..] {
            let Some(parts) = module_exp.as_list() else {
                return Err(Diagnostic::error("Invalid module specification"));
            };
            if parts.first().and_then(Expr::as_symbol) != Some("module") {
                return Err(Diagnostic::error(
                    "Module specification must start with 'module'",
                ));
            }
            let Some(name) = parts.get(1).and_then(Expr::as_symbol) else {
                return Err(Diagnostic::error("Module name must be a symbol"));
            };
            requested.push(name.to_string());
        }

        let (_, mut found) = cg.modules.borrow_mut().load_module_file(file_path)?;
        if found.is_empty() {
            return Err(Diagnostic::error(format!(
                "No modules found in file: {file_path}"
            )));
        }
        found.sort();

        let to_register = if requested.is_empty() {
            found
        } else {
            for name in &requested {
                if !found.iter().any(|f| f == name) {
                    return Err(Diagnostic::error(format!("Module not found: {name}")));
                }
            }
            requested
        };

        for name in &to_register {
            register_module(name, cg, dispatcher)?;
        }

        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }
}

pub struct ModuleGenerator;

impl Generator for ModuleGenerator {
    fn name(&self) -> &'static str {
        "defmodule"
    }

    fn priority(&self) -> i32 {
        960
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("defmodule")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() < 2 {
            return Err(Diagnostic::error(
                "Invalid module definition: (defmodule name ...)",
            ));
        }
        let Some(module_name) = items[1].as_symbol() else {
            return Err(Diagnostic::error("Module name must be a symbol"));
        };

        {
            let mut modules = cg.modules.borrow_mut();
            let file = modules.entry_file();
            modules.ensure_inline_module(module_name, file);
            modules.mark_used(module_name)?;
        }

        lower_module_children(module_name, &items[2..], cg, dispatcher)?;
        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }
}

pub struct ModuleUseGenerator;

impl Generator for ModuleUseGenerator {
    fn name(&self) -> &'static str {
        "moduleuse"
    }

    fn priority(&self) -> i32 {
        920
    }

    fn accepts(&self, node: &Expr, _cg: &CodeGen<'_>) -> bool {
        node.is_form("moduleuse")
    }

    fn lower<'ctx>(
        &self,
        node: &Expr,
        cg: &CodeGen<'ctx>,
        _dispatcher: &Dispatcher,
    ) -> DiagnosticResult<Lowered<'ctx>> {
        let items = node.as_list().unwrap_or_default();
        if items.len() != 2 {
            return Err(Diagnostic::error(
                "moduleuse requires exactly one argument: (moduleuse module.name)",
            ));
        }
        let Some(module_name) = items[1].as_symbol() else {
            return Err(Diagnostic::error("Module name must be a symbol"));
        };

        if !cg.modules.borrow().has_module(module_name) {
            return Err(Diagnostic::error(format!(
                "Module not found: {module_name}"
            )));
        }

        let exports = cg.modules.borrow().exports(module_name);
        for symbol in exports {
            let info = cg.env.borrow().lookup_fn(&symbol);
            if let Some(info) = info {
                cg.modules
                    .borrow_mut()
                    .set_module_fn(module_name, &symbol, info);
            }
        }

        Ok(Some(cg.i32_t.const_int(0, false).into()))
    }
}
