//! # CHR AST - Abstract Syntax Tree Types
//!
//! Surface representation of CHR programs: terms, head/body constraints,
//! rules, and the program itself. Used by the parser, the normalizer, and
//! the occurrence expansion.
//!
//! Every type implements `Display` producing re-parseable surface syntax,
//! so a parsed program can be un-parsed and parsed again into an equal AST.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Signatures
// ============================================================================

/// `symbol/arity`, the key that groups constraints for dispatch and store
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub symbol: String,
    pub arity: usize,
}

impl Signature {
    pub fn new(symbol: impl Into<String>, arity: usize) -> Self {
        Signature {
            symbol: symbol.into(),
            arity,
        }
    }

    /// Parse a `symbol/arity` declaration such as `gcd/1`.
    pub fn parse(text: &str) -> Option<Self> {
        let (symbol, arity) = text.rsplit_once('/')?;
        if symbol.is_empty() {
            return None;
        }
        let arity = arity.parse().ok()?;
        Some(Signature::new(symbol, arity))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.arity)
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Binary infix operators, loosest level last. Each inner level is
/// left-associative.
pub const INFIX_LEVELS: &[&[&str]] = &[
    &["*", "/", "%"],
    &["+", "-"],
    &["==", "!=", "<=", "<", ">=", ">"],
    &["and", "or"],
    &["="],
];

/// Unary prefix operators and the binary level they bind tighter than.
pub const UNARY_MINUS: &str = "-";
pub const UNARY_NOT: &str = "not";

/// True iff `symbol` is one of the infix operators.
pub fn is_infix_operator(symbol: &str) -> bool {
    INFIX_LEVELS.iter().any(|level| level.contains(&symbol))
}

// ============================================================================
// Terms
// ============================================================================

/// A term: a variable, a constant (scalar or container), or a functor.
/// Infix operator applications desugar to functors (`$A + 1` becomes
/// `'+'($A, 1)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    /// `$Name`
    Var(String),
    Int(i64),
    Str(String),
    Bool(bool),
    /// `[t, ...]`
    List(Vec<Term>),
    /// `(t, t, ...)` with at least two elements
    Tuple(Vec<Term>),
    /// `{k: v, ...}` with ground keys
    Dict(Vec<(Term, Term)>),
    /// `f(t, ...)`, including quoted operators `'op'(t, ...)`
    Functor { symbol: String, args: Vec<Term> },
}

impl Term {
    pub fn functor(symbol: impl Into<String>, args: Vec<Term>) -> Self {
        Term::Functor {
            symbol: symbol.into(),
            args,
        }
    }

    /// Nullary functor, e.g. the body constraint `true`.
    pub fn atom(symbol: impl Into<String>) -> Self {
        Term::functor(symbol, vec![])
    }

    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Term::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Signature of a functor term, if it is one.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Term::Functor { symbol, args } => Some(Signature::new(symbol.clone(), args.len())),
            _ => None,
        }
    }

    /// True iff no variable occurs anywhere in the term.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Int(_) | Term::Str(_) | Term::Bool(_) => true,
            Term::List(items) | Term::Tuple(items) => items.iter().all(Term::is_ground),
            Term::Dict(entries) => entries.iter().all(|(k, v)| k.is_ground() && v.is_ground()),
            Term::Functor { args, .. } => args.iter().all(Term::is_ground),
        }
    }

    /// All variable names occurring in the term, in sorted order.
    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    pub(crate) fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::Int(_) | Term::Str(_) | Term::Bool(_) => {}
            Term::List(items) | Term::Tuple(items) => {
                for item in items {
                    item.collect_vars(out);
                }
            }
            Term::Dict(entries) => {
                for (key, value) in entries {
                    key.collect_vars(out);
                    value.collect_vars(out);
                }
            }
            Term::Functor { args, .. } => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
        }
    }
}

fn fmt_comma_separated(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn is_plain_symbol(symbol: &str) -> bool {
    let mut chars = symbol.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) => write!(f, "${name}"),
            Term::Int(n) => write!(f, "{n}"),
            Term::Str(s) => write!(f, "\"{s}\""),
            Term::Bool(true) => write!(f, "True"),
            Term::Bool(false) => write!(f, "False"),
            Term::List(items) => {
                write!(f, "[")?;
                fmt_comma_separated(f, items)?;
                write!(f, "]")
            }
            Term::Tuple(items) => {
                write!(f, "(")?;
                fmt_comma_separated(f, items)?;
                write!(f, ")")
            }
            Term::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Term::Functor { symbol, args } => {
                // Operators print in their surface form so the output parses
                // back to the same tree.
                if args.len() == 2 && is_infix_operator(symbol) {
                    return write!(f, "({} {} {})", args[0], symbol, args[1]);
                }
                if args.len() == 1 && (symbol == UNARY_MINUS || symbol == UNARY_NOT) {
                    return write!(f, "({} {})", symbol, args[0]);
                }
                if is_plain_symbol(symbol) {
                    write!(f, "{symbol}")?;
                } else {
                    write!(f, "'{symbol}'")?;
                }
                if !args.is_empty() {
                    write!(f, "(")?;
                    fmt_comma_separated(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

// ============================================================================
// Constraints and rules
// ============================================================================

/// A head or body constraint: a functor restricted to a symbol plus
/// argument terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub symbol: String,
    pub args: Vec<Term>,
}

impl Constraint {
    pub fn new(symbol: impl Into<String>, args: Vec<Term>) -> Self {
        Constraint {
            symbol: symbol.into(),
            args,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn signature(&self) -> Signature {
        Signature::new(self.symbol.clone(), self.args.len())
    }

    /// View a functor term as a constraint.
    pub fn from_term(term: &Term) -> Option<Constraint> {
        match term {
            Term::Functor { symbol, args } => Some(Constraint::new(symbol.clone(), args.clone())),
            _ => None,
        }
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for arg in &self.args {
            arg.collect_vars(&mut out);
        }
        out
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Term::functor(self.symbol.clone(), self.args.clone()))
    }
}

/// A surface rule `name @ K \ R <=> G | B`.
///
/// Simplification has empty kept heads, propagation empty removed heads,
/// simpagation both. The parser guarantees at least one head is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub kept: Vec<Constraint>,
    pub removed: Vec<Constraint>,
    pub guard: Vec<Term>,
    pub body: Vec<Term>,
}

impl Rule {
    /// All variables occurring in the rule's heads.
    pub fn head_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for head in self.kept.iter().chain(&self.removed) {
            for arg in &head.args {
                arg.collect_vars(&mut out);
            }
        }
        out
    }
}

fn fmt_constraint_list(f: &mut fmt::Formatter<'_>, items: &[Constraint]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn fmt_term_list(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ ", self.name)?;
        match (self.kept.is_empty(), self.removed.is_empty()) {
            (false, false) => {
                fmt_constraint_list(f, &self.kept)?;
                write!(f, " \\ ")?;
                fmt_constraint_list(f, &self.removed)?;
                write!(f, " <=> ")?;
            }
            (false, true) => {
                fmt_constraint_list(f, &self.kept)?;
                write!(f, " ==> ")?;
            }
            (true, false) => {
                fmt_constraint_list(f, &self.removed)?;
                write!(f, " <=> ")?;
            }
            (true, true) => return Err(fmt::Error),
        }
        if !self.guard.is_empty() {
            fmt_term_list(f, &self.guard)?;
            write!(f, " | ")?;
        }
        if self.body.is_empty() {
            write!(f, "true")?;
        } else {
            fmt_term_list(f, &self.body)?;
        }
        write!(f, ".")
    }
}

// ============================================================================
// Programs
// ============================================================================

/// A complete CHR program: the solver class name, the declared user
/// constraints, and the rules in textual order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub class_name: String,
    pub constraints: Vec<Signature>,
    pub rules: Vec<Rule>,
}

impl Program {
    /// True iff `signature` is a declared user constraint.
    pub fn declares(&self, signature: &Signature) -> bool {
        self.constraints.contains(signature)
    }

    /// True iff `symbol` is declared with any arity.
    pub fn declares_symbol(&self, symbol: &str) -> bool {
        self.constraints.iter().any(|s| s.symbol == symbol)
    }

    /// The declared arities of `symbol`, in declaration order.
    pub fn arities_of(&self, symbol: &str) -> Vec<usize> {
        self.constraints
            .iter()
            .filter(|s| s.symbol == symbol)
            .map(|s| s.arity)
            .collect()
    }

    /// The declared symbols in declaration order, without duplicates.
    pub fn symbols(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.constraints
            .iter()
            .filter(|s| seen.insert(s.symbol.as_str()))
            .map(|s| s.symbol.as_str())
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "class {}.", self.class_name)?;
        write!(f, "constraints ")?;
        for (i, sig) in self.constraints.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{sig}")?;
        }
        writeln!(f, ".")?;
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_parse() {
        assert_eq!(Signature::parse("gcd/1"), Some(Signature::new("gcd", 1)));
        assert_eq!(Signature::parse("leq/2"), Some(Signature::new("leq", 2)));
        assert_eq!(Signature::parse("nope"), None);
        assert_eq!(Signature::parse("/1"), None);
    }

    #[test]
    fn test_term_vars() {
        let term = Term::functor(
            "f",
            vec![
                Term::var("X"),
                Term::List(vec![Term::var("Y"), Term::Int(1)]),
                Term::var("X"),
            ],
        );
        let vars: Vec<String> = term.vars().into_iter().collect();
        assert_eq!(vars, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_groundness() {
        assert!(Term::functor("f", vec![Term::Int(1)]).is_ground());
        assert!(!Term::Dict(vec![(Term::Int(1), Term::var("V"))]).is_ground());
    }

    #[test]
    fn test_term_display_round_shape() {
        let term = Term::functor("==", vec![Term::var("N"), Term::Int(0)]);
        assert_eq!(term.to_string(), "($N == 0)");

        let quoted = Term::functor("-", vec![Term::var("M"), Term::var("N")]);
        assert_eq!(quoted.to_string(), "($M - $N)");

        let nested = Term::functor("gcd", vec![quoted]);
        assert_eq!(nested.to_string(), "gcd(($M - $N))");
    }

    #[test]
    fn test_rule_display_forms() {
        let gcd = |arg: Term| Constraint::new("gcd", vec![arg]);
        let simplification = Rule {
            name: "r1".into(),
            kept: vec![],
            removed: vec![gcd(Term::var("N"))],
            guard: vec![Term::functor("==", vec![Term::var("N"), Term::Int(0)])],
            body: vec![],
        };
        assert_eq!(simplification.to_string(), "r1 @ gcd($N) <=> ($N == 0) | true.");

        let simpagation = Rule {
            name: "r2".into(),
            kept: vec![gcd(Term::var("M"))],
            removed: vec![gcd(Term::var("N"))],
            guard: vec![],
            body: vec![Term::functor("gcd", vec![Term::var("N")])],
        };
        assert_eq!(simpagation.to_string(), "r2 @ gcd($M) \\ gcd($N) <=> gcd($N).");

        let propagation = Rule {
            name: "t".into(),
            kept: vec![Constraint::new("a", vec![])],
            removed: vec![],
            guard: vec![],
            body: vec![Term::atom("b")],
        };
        assert_eq!(propagation.to_string(), "t @ a ==> b.");
    }

    #[test]
    fn test_program_lookups() {
        let program = Program {
            class_name: "P".into(),
            constraints: vec![Signature::new("a", 0), Signature::new("a", 2), Signature::new("b", 1)],
            rules: vec![],
        };
        assert!(program.declares(&Signature::new("a", 0)));
        assert!(!program.declares(&Signature::new("a", 1)));
        assert!(program.declares_symbol("b"));
        assert_eq!(program.arities_of("a"), vec![0, 2]);
        assert_eq!(program.symbols(), vec!["a", "b"]);
    }
}
