//! Module loading and cross-file resolution.
//!
//! The manager loads, normalizes, and caches external source files,
//! extracts `defmodule` forms (at any depth inside top-level `scope`s),
//! registers their exported symbols, enforces export uniqueness across
//! modules, resolves dotted cross-module references, and tracks the
//! file dependency graph for circular-import detection. Re-importing an
//! already-loaded file is silently deduplicated.
//!
//! Lowering a module's body needs the dispatcher, so the registration
//! walk itself lives with the import generator; this manager owns all
//! bookkeeping state.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::context::{FnInfo, VarInfo};
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::preprocess;

/// A named collection of definitions exported from a source file.
pub struct ModuleInfo<'ctx> {
    pub name: String,
    pub file_path: PathBuf,
    pub exported_symbols: HashSet<String>,
    pub functions: HashMap<String, FnInfo<'ctx>>,
    pub variables: HashMap<String, VarInfo<'ctx>>,
    pub is_used: bool,
    pub is_loaded: bool,
    /// Raw text of the `(defmodule …)` form, parsed on registration.
    pub content: String,
}

/// Result of a dotted-name lookup inside a module.
pub enum ResolvedSymbol<'ctx> {
    Function(FnInfo<'ctx>),
    Variable(VarInfo<'ctx>),
}

pub struct ModuleManager<'ctx> {
    modules: HashMap<String, ModuleInfo<'ctx>>,
    symbol_to_module: HashMap<String, String>,
    loaded_files: HashSet<PathBuf>,
    file_dependencies: HashMap<PathBuf, HashSet<PathBuf>>,
    /// Files whose module bodies are currently being registered; the
    /// top entry is the importer for dependency edges.
    loading: Vec<PathBuf>,
    current_directory: PathBuf,
}

impl<'ctx> ModuleManager<'ctx> {
    pub fn new(current_directory: PathBuf) -> Self {
        let current_directory = if current_directory.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            current_directory
        };
        ModuleManager {
            modules: HashMap::new(),
            symbol_to_module: HashMap::new(),
            loaded_files: HashSet::new(),
            file_dependencies: HashMap::new(),
            loading: Vec::new(),
            current_directory,
        }
    }

    pub fn set_current_directory(&mut self, dir: PathBuf) {
        self.current_directory = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
    }

    /// Marks the unit's entry file as the root of the dependency graph.
    pub fn set_entry_file(&mut self, file: PathBuf) {
        self.file_dependencies.entry(file.clone()).or_default();
        self.loading = vec![file];
    }

    /// The unit's entry file (dependency-graph root).
    pub fn entry_file(&self) -> PathBuf {
        self.loading
            .first()
            .cloned()
            .unwrap_or_else(|| self.current_directory.join("<unit>"))
    }

    pub fn push_loading(&mut self, file: PathBuf) {
        self.loading.push(file);
    }

    pub fn pop_loading(&mut self) {
        self.loading.pop();
    }

    /// Resolves an import path against the compiler's current
    /// directory, appending `.glz` when the plain path does not exist.
    pub fn resolve_file_path(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let resolved = self.current_directory.join(path);
        if resolved.exists() {
            return resolved;
        }

        if path.extension().is_none_or(|ext| ext != "glz") {
            let mut with_glz = resolved.clone().into_os_string();
            with_glz.push(".glz");
            let with_glz = PathBuf::from(with_glz);
            if with_glz.exists() {
                return with_glz;
            }
        }

        resolved
    }

    /// Loads a module file, returning its resolved path and the names
    /// of the modules it defines. Already-loaded files are
    /// deduplicated; a file that is mid-registration is a circular
    /// import.
    pub fn load_module_file(
        &mut self,
        file_path: &str,
    ) -> DiagnosticResult<(PathBuf, Vec<String>)> {
        let resolved = self.resolve_file_path(file_path);

        if let Some(importer) = self.loading.last().cloned()
            && importer != resolved
        {
            self.file_dependencies
                .entry(importer)
                .or_default()
                .insert(resolved.clone());
        }

        if self.loaded_files.contains(&resolved) {
            let names = self
                .modules
                .values()
                .filter(|m| m.file_path == resolved)
                .map(|m| m.name.clone())
                .collect();
            return Ok((resolved, names));
        }

        if self.loading.contains(&resolved) {
            return Err(Diagnostic::error(format!(
                "circular import of module file: {}",
                resolved.display()
            )));
        }

        let content = std::fs::read_to_string(&resolved).map_err(|_| {
            Diagnostic::error(format!("Cannot open module file: {}", resolved.display()))
        })?;

        self.loaded_files.insert(resolved.clone());
        self.file_dependencies.entry(resolved.clone()).or_default();

        let processed = preprocess::normalize(&content)?;
        let definitions = extract_module_definitions(&processed);

        let mut names = Vec::with_capacity(definitions.len());
        for (name, text) in definitions {
            self.modules.insert(
                name.clone(),
                ModuleInfo {
                    name: name.clone(),
                    file_path: resolved.clone(),
                    exported_symbols: HashSet::new(),
                    functions: HashMap::new(),
                    variables: HashMap::new(),
                    is_used: false,
                    is_loaded: true,
                    content: text,
                },
            );
            names.push(name);
        }

        Ok((resolved, names))
    }

    /// Registers a module defined inline in the current unit.
    pub fn ensure_inline_module(&mut self, name: &str, file: PathBuf) {
        self.modules.entry(name.to_string()).or_insert(ModuleInfo {
            name: name.to_string(),
            file_path: file,
            exported_symbols: HashSet::new(),
            functions: HashMap::new(),
            variables: HashMap::new(),
            is_used: false,
            is_loaded: true,
            content: String::new(),
        });
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.get(name).is_some_and(|m| m.is_loaded)
    }

    pub fn module_file(&self, name: &str) -> Option<PathBuf> {
        self.modules.get(name).map(|m| m.file_path.clone())
    }

    pub fn module_content(&self, name: &str) -> Option<String> {
        self.modules.get(name).map(|m| m.content.clone())
    }

    /// Flags the module as used; returns the previous flag so callers
    /// can skip re-registration.
    pub fn mark_used(&mut self, name: &str) -> DiagnosticResult<bool> {
        let module = self
            .modules
            .get_mut(name)
            .ok_or_else(|| Diagnostic::error(format!("Module not found in registry: {name}")))?;
        let was_used = module.is_used;
        module.is_used = true;
        Ok(was_used)
    }

    pub fn record_export(&mut self, module: &str, symbol: &str) {
        if let Some(m) = self.modules.get_mut(module) {
            m.exported_symbols.insert(symbol.to_string());
        }
    }

    pub fn exports(&self, module: &str) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .modules
            .get(module)
            .map(|m| m.exported_symbols.iter().cloned().collect())
            .unwrap_or_default();
        symbols.sort();
        symbols
    }

    pub fn exports_symbol(&self, module: &str, symbol: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|m| m.exported_symbols.contains(symbol))
    }

    pub fn set_module_fn(&mut self, module: &str, symbol: &str, info: FnInfo<'ctx>) {
        if let Some(m) = self.modules.get_mut(module) {
            m.functions.insert(symbol.to_string(), info);
        }
    }

    /// Enforces global export uniqueness: a second module exporting the
    /// same symbol is a fatal symbol-conflict error.
    pub fn finish_exports(&mut self, module: &str) -> DiagnosticResult<()> {
        for symbol in self.exports(module) {
            match self.symbol_to_module.get(&symbol) {
                Some(owner) if owner != module => {
                    return Err(Diagnostic::error(format!(
                        "Symbol conflict: {symbol} already exported from module {owner}"
                    )));
                }
                Some(_) => {}
                None => {
                    self.symbol_to_module
                        .insert(symbol, module.to_string());
                }
            }
        }
        Ok(())
    }

    /// Resolves a dotted `Module.member` reference: functions first,
    /// then variables.
    pub fn resolve_symbol(&self, symbol: &str) -> DiagnosticResult<Option<ResolvedSymbol<'ctx>>> {
        let Some((module_name, member)) = symbol.split_once('.') else {
            return Ok(None);
        };

        let module = self
            .modules
            .get(module_name)
            .filter(|m| m.is_loaded)
            .ok_or_else(|| Diagnostic::error(format!("Module not found: {module_name}")))?;

        if let Some(f) = module.functions.get(member) {
            return Ok(Some(ResolvedSymbol::Function(f.clone())));
        }
        if let Some(v) = module.variables.get(member) {
            return Ok(Some(ResolvedSymbol::Variable(v.clone())));
        }

        Err(Diagnostic::error(format!(
            "Symbol not found in module: {member}"
        )))
    }

    /// Depth-first reachability over the file dependency graph:
    /// whether `target` is reachable from `from`.
    pub fn check_circular_dependency(&self, from: &Path, target: &Path) -> bool {
        let mut visited = HashSet::new();
        self.reaches(from, target, &mut visited)
    }

    fn reaches<'a>(
        &'a self,
        current: &'a Path,
        target: &Path,
        visited: &mut HashSet<&'a Path>,
    ) -> bool {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        let Some(deps) = self.file_dependencies.get(current) else {
            return false;
        };
        deps.iter().any(|dep| self.reaches(dep, target, visited))
    }
}

fn find_matching_parenthesis(s: &str, start: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i64;
    for (offset, &b) in bytes.iter().enumerate().skip(start) {
        if b == b'(' {
            depth += 1;
        } else if b == b')' {
            depth -= 1;
            if depth == 0 {
                return Some(offset);
            }
        }
    }
    None
}

fn extract_module_name(expr: &str) -> Option<String> {
    // Skip past "(defmodule" and surrounding whitespace
    let rest = expr.get(10..)?.trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || c == ')')
        .unwrap_or(rest.len());
    let name = &rest[..end];
    if name.is_empty() { None } else { Some(name.to_string()) }
}

/// Scans normalized text for `(defmodule Name …)` forms at the top
/// level or nested at any depth inside `(scope …)` wrappers.
fn extract_module_definitions(content: &str) -> Vec<(String, String)> {
    let mut definitions = Vec::new();
    walk_for_modules(content, &mut definitions);
    definitions
}

fn walk_for_modules(s: &str, out: &mut Vec<(String, String)>) {
    let bytes = s.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        if bytes[pos] == b'(' {
            let Some(end) = find_matching_parenthesis(s, pos) else {
                break;
            };
            let expr = &s[pos..=end];
            if expr.starts_with("(defmodule") {
                if let Some(name) = extract_module_name(expr) {
                    out.push((name, expr.to_string()));
                }
            } else if expr.starts_with("(scope") {
                walk_for_modules(&expr[6..expr.len() - 1], out);
            }
            pos = end + 1;
        } else {
            pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_defmodule_forms_under_scopes() {
        let text = "(scope (defmodule A (defn (f !int) () 1)) (scope (defmodule B 2)))";
        let defs = extract_module_definitions(text);
        let names: Vec<&str> = defs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert!(defs[0].1.starts_with("(defmodule A"));
    }

    #[test]
    fn non_module_forms_are_ignored() {
        let text = "(scope (var x 1) (fprint \"hi\"))";
        assert!(extract_module_definitions(text).is_empty());
    }

    #[test]
    fn dependency_walk_detects_cycles() {
        let mut mgr: ModuleManager<'static> = ModuleManager::new(PathBuf::from("."));
        let a = PathBuf::from("a.glz");
        let b = PathBuf::from("b.glz");
        let c = PathBuf::from("c.glz");
        mgr.file_dependencies
            .entry(a.clone())
            .or_default()
            .insert(b.clone());
        mgr.file_dependencies
            .entry(b.clone())
            .or_default()
            .insert(c.clone());

        assert!(mgr.check_circular_dependency(&a, &c));
        assert!(!mgr.check_circular_dependency(&c, &a));
        // Closing the cycle makes the reverse direction reachable too
        mgr.file_dependencies
            .entry(c.clone())
            .or_default()
            .insert(a.clone());
        assert!(mgr.check_circular_dependency(&c, &a));
    }

    #[test]
    fn missing_file_is_a_module_error() {
        let mut mgr: ModuleManager<'static> = ModuleManager::new(PathBuf::from("."));
        let err = mgr.load_module_file("definitely_missing_lib").unwrap_err();
        assert!(err.message.contains("Cannot open module file"));
    }
}
