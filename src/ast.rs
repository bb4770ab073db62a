//! Expression tree for the Galluz language.
//!
//! Every parsed construct is one of five tagged variants; lists are the
//! universal compound form and the head of a non-empty list determines
//! the syntactic construct.

/// A single AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 64-bit integer literal
    Number(i64),
    /// Double-precision literal
    Fractional(f64),
    /// String literal with escape sequences still in raw form
    Str(String),
    /// Identifier or operator token
    Symbol(String),
    /// Ordered sequence of expressions
    List(Vec<Expr>),
}

impl Expr {
    /// Name of the variant, used in dispatch-failure diagnostics.
    pub fn tag_name(&self) -> &'static str {
        match self {
            Expr::Number(_) => "number",
            Expr::Fractional(_) => "fractional",
            Expr::Str(_) => "string",
            Expr::Symbol(_) => "symbol",
            Expr::List(_) => "list",
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// The head symbol of a non-empty list, if any.
    pub fn head_symbol(&self) -> Option<&str> {
        self.as_list().and_then(|items| items.first()).and_then(Expr::as_symbol)
    }

    /// True when the node is a list whose head is the given symbol.
    pub fn is_form(&self, head: &str) -> bool {
        self.head_symbol() == Some(head)
    }

    /// Printed form truncated for traceback and diagnostic use.
    pub fn display_truncated(&self) -> String {
        let mut s = self.to_string();
        if s.len() > 120 {
            s.truncate(117);
            s.push_str("...");
        }
        s
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Fractional(x) => write!(f, "{x}"),
            Expr::Str(s) => write!(f, "\"{}\"", s.replace('\n', "\\n")),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::List(items) => {
                if items.is_empty() {
                    return write!(f, "[]");
                }
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
