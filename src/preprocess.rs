//! Source normalization for the Galluz compiler.
//!
//! Before parsing, raw text is rewritten into a single top-level
//! expression: comments are stripped (string-aware), whitespace is
//! collapsed line by line, parenthesis balance is checked, and if the
//! file contains several top-level expressions they are wrapped in a
//! synthetic `(scope …)` so the rest of the pipeline always sees one
//! expression. The same module owns the escape table applied to string
//! literals when they are materialized into the IR.

use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// Normalizes raw source text into a single top-level expression.
pub fn normalize(code: &str) -> DiagnosticResult<String> {
    let mut processed = String::new();

    for line in code.lines() {
        let no_comments = remove_comments(line);
        let trimmed = no_comments.trim_start();
        if !trimmed.is_empty() {
            processed.push_str(trimmed);
            processed.push(' ');
        }
    }

    if !is_balanced(&processed) {
        return Err(Diagnostic::error("Unbalanced parentheses in program"));
    }

    let mut expressions = split_top_level(&processed)?;

    if expressions.is_empty() {
        return Err(Diagnostic::error("No expressions found in program"));
    }

    if expressions.len() == 1 {
        return Ok(expressions.remove(0));
    }

    let mut program = String::from("(scope");
    for expr in &expressions {
        program.push(' ');
        program.push_str(expr);
    }
    program.push(')');
    Ok(program)
}

/// Applies the backslash escape table to a string literal destined for
/// the IR. `\` followed by an unrecognized character yields that
/// character literally.
pub fn postprocess_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            match c {
                'n' => result.push('\n'),
                't' => result.push('\t'),
                'r' => result.push('\r'),
                '0' => result.push('\0'),
                '"' => result.push('"'),
                '\\' => result.push('\\'),
                '/' => result.push('/'),
                other => result.push(other),
            }
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            result.push(c);
        }
    }

    result
}

fn remove_comments(line: &str) -> String {
    let mut result = String::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut in_block_comment = false;

    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied().unwrap_or('\0');

        if in_block_comment {
            if c == '*' && next == '/' {
                in_block_comment = false;
                i += 1;
            }
            i += 1;
            continue;
        }

        if escaped {
            result.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
            result.push(c);
        } else if c == '"' {
            in_string = !in_string;
            result.push(c);
        } else if !in_string && c == '/' && next == '/' {
            // Rest of the line is a comment
            break;
        } else if !in_string && c == '/' && next == '*' {
            in_block_comment = true;
            i += 1;
        } else {
            result.push(c);
        }
        i += 1;
    }

    result
}

fn is_balanced(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    let mut depth: i64 = 0;

    for c in text.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_string = !in_string;
        } else if !in_string {
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
        }
    }

    depth == 0 && !in_string
}

fn split_top_level(text: &str) -> DiagnosticResult<Vec<String>> {
    let mut expressions = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth: i64 = 0;

    for c in text.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = !in_string;
            }
            continue;
        }

        if c == '"' && depth > 0 {
            in_string = true;
            current.push(c);
        } else if c == '(' {
            depth += 1;
            current.push(c);
        } else if c == ')' {
            depth -= 1;
            current.push(c);
            if depth == 0 {
                expressions.push(std::mem::take(&mut current));
            }
        } else if depth > 0 {
            current.push(c);
        } else if !c.is_whitespace() {
            return Err(Diagnostic::error(format!(
                "Unexpected character outside expression: {c}"
            )));
        }
    }

    Ok(expressions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_multiple_expressions_in_scope() {
        let out = normalize("(var x 1)\n(fprint \"%d\" x)").unwrap();
        assert_eq!(out, "(scope (var x 1) (fprint \"%d\" x))");
    }

    #[test]
    fn single_expression_is_untouched() {
        let out = normalize("(do (var x 1))").unwrap();
        assert_eq!(out, "(do (var x 1))");
    }

    #[test]
    fn strips_line_and_block_comments() {
        let out = normalize("// header\n(var x 1) /* trailing */\n").unwrap();
        assert_eq!(out, "(var x 1)");
    }

    #[test]
    fn comments_inside_strings_survive() {
        let out = normalize("(fprint \"a // b\")").unwrap();
        assert_eq!(out, "(fprint \"a // b\")");
    }

    #[test]
    fn unbalanced_parentheses_are_fatal() {
        assert!(normalize("(var x 1").is_err());
        assert!(normalize("(var x 1))").is_err());
    }

    #[test]
    fn stray_characters_outside_expressions_are_fatal() {
        assert!(normalize("(var x 1) junk").is_err());
    }

    #[test]
    fn empty_program_is_fatal() {
        assert!(normalize("// nothing here\n").is_err());
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize("(var x 1)\n(var y 2)").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn escape_table_handles_known_and_unknown_escapes() {
        assert_eq!(postprocess_string("a\\nb"), "a\nb");
        assert_eq!(postprocess_string("tab\\there"), "tab\there");
        assert_eq!(postprocess_string("q\\qz"), "qqz");
        assert_eq!(postprocess_string("slash\\/"), "slash/");
        assert_eq!(postprocess_string("quote\\\""), "quote\"");
    }
}
