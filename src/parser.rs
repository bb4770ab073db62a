//! S-expression reader for normalized Galluz source.
//!
//! The reader operates on the output of [`crate::preprocess::normalize`],
//! so the input is a single balanced expression with collapsed
//! whitespace. Tokens are parentheses, string literals (escape
//! sequences kept raw), and atoms; an atom that parses as an integer is
//! a number, one with a decimal point is a fractional, anything else is
//! a symbol.

use crate::ast::Expr;
use crate::diagnostics::{Diagnostic, DiagnosticResult};

/// Parses one expression out of normalized source text.
pub fn parse(text: &str) -> DiagnosticResult<Expr> {
    let chars: Vec<char> = text.chars().collect();
    let mut reader = Reader { chars, pos: 0 };
    reader.skip_whitespace();
    let expr = reader.read_expr()?;
    reader.skip_whitespace();
    if reader.pos < reader.chars.len() {
        return Err(Diagnostic::error(
            "Trailing input after top-level expression",
        ));
    }
    Ok(expr)
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_expr(&mut self) -> DiagnosticResult<Expr> {
        match self.peek() {
            Some('(') => self.read_list(),
            Some('"') => self.read_string(),
            Some(_) => self.read_atom(),
            None => Err(Diagnostic::error("Unexpected end of input")),
        }
    }

    fn read_list(&mut self) -> DiagnosticResult<Expr> {
        self.bump(); // consume '('
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(')') => {
                    self.bump();
                    return Ok(Expr::List(items));
                }
                Some(_) => items.push(self.read_expr()?),
                None => return Err(Diagnostic::error("Unterminated list")),
            }
        }
    }

    fn read_string(&mut self) -> DiagnosticResult<Expr> {
        self.bump(); // consume opening quote
        let mut value = String::new();
        let mut escaped = false;
        loop {
            match self.bump() {
                Some(c) if escaped => {
                    value.push(c);
                    escaped = false;
                }
                Some('\\') => {
                    value.push('\\');
                    escaped = true;
                }
                Some('"') => return Ok(Expr::Str(value)),
                Some(c) => value.push(c),
                None => return Err(Diagnostic::error("Unterminated string literal")),
            }
        }
    }

    fn read_atom(&mut self) -> DiagnosticResult<Expr> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && c != '(' && c != ')' && c != '"')
        {
            self.pos += 1;
        }
        let token: String = self.chars[start..self.pos].iter().collect();
        if token.is_empty() {
            return Err(Diagnostic::error("Empty token"));
        }

        if let Ok(n) = token.parse::<i64>() {
            return Ok(Expr::Number(n));
        }
        if token.contains('.')
            && token
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit() || c == '-')
            && let Ok(x) = token.parse::<f64>()
        {
            return Ok(Expr::Fractional(x));
        }
        Ok(Expr::Symbol(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers_fractionals_and_symbols() {
        let expr = parse("(+ 1 -2 3.5 x)").unwrap();
        assert_eq!(
            expr,
            Expr::List(vec![
                Expr::Symbol("+".into()),
                Expr::Number(1),
                Expr::Number(-2),
                Expr::Fractional(3.5),
                Expr::Symbol("x".into()),
            ])
        );
    }

    #[test]
    fn string_literals_keep_raw_escapes() {
        let expr = parse("(fprint \"a\\nb\")").unwrap();
        let Expr::List(items) = expr else {
            panic!("expected list")
        };
        assert_eq!(items[1], Expr::Str("a\\nb".into()));
    }

    #[test]
    fn nested_lists_parse() {
        let expr = parse("(var (x !int) (+ 1 2))").unwrap();
        assert!(expr.is_form("var"));
        let items = expr.as_list().unwrap();
        assert!(items[1].is_form("x"));
        assert!(items[2].is_form("+"));
    }

    #[test]
    fn type_markers_are_symbols() {
        let expr = parse("!int").unwrap();
        assert_eq!(expr, Expr::Symbol("!int".into()));
    }

    #[test]
    fn unterminated_list_is_fatal() {
        assert!(parse("(var x 1").is_err());
        assert!(parse("(var x 1) extra").is_err());
    }

    #[test]
    fn lone_minus_is_a_symbol() {
        assert_eq!(parse("-").unwrap(), Expr::Symbol("-".into()));
    }
}
