//! # CHR Parser
//!
//! Lexes and parses CHR source into the AST: a class declaration, the
//! constraint declarations, then rules terminated by `.`.
//!
//! Terms support integer / string / boolean literals, `$Name` variables,
//! prefix functors, quoted operators, lists, tuples, dicts, and infix
//! operators with the fixed precedence table (tight to loose): unary `-`;
//! `* / %`; binary `+ -`; unary `not`; comparisons; `and or`; `=`. Infix
//! forms desugar to functors.
//!
//! `%` starts a line comment unless it sits between two operands, where it
//! is the modulo operator.

use thiserror::Error;

use crate::ast::{Constraint, Program, Rule, Signature, Term};

/// A syntax error with its source position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

pub type ParseResult<T> = Result<T, ParseError>;

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// Bare identifier: symbols, keywords, class names, `True` / `False`.
    Ident(String),
    /// `$Name` variable.
    Var(String),
    Int(i64),
    Str(String),
    /// `'op'` quoted operator symbol.
    Quoted(String),
    /// Operator or punctuation.
    Punct(&'static str),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    column: usize,
}

const PUNCT: &[&str] = &[
    "<=>", "==>", "==", "!=", "<=", ">=", "=", "<", ">", "+", "-", "*", "/", "%", "@", ".", ",",
    "|", "(", ")", "[", "]", "{", "}", ":", "\\",
];

struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' {
                break;
            }
            self.bump();
        }
    }

    fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
                self.bump();
            }
            let Some(c) = self.peek() else {
                break;
            };
            let (line, column) = (self.line, self.column);

            // `%` is modulo between operands, a comment otherwise.
            if c == b'%' && !self.modulo_position(&tokens) {
                self.skip_line();
                continue;
            }

            let kind = if c.is_ascii_digit() {
                self.lex_int()?
            } else if c == b'$' {
                self.bump();
                TokenKind::Var(self.lex_name()?)
            } else if c == b'"' {
                self.lex_string()?
            } else if c == b'\'' {
                self.lex_quoted()?
            } else if c.is_ascii_alphabetic() || c == b'_' {
                TokenKind::Ident(self.lex_name()?)
            } else {
                self.lex_punct()?
            };
            tokens.push(Token { kind, line, column });
        }
        Ok(tokens)
    }

    /// A `%` is the modulo operator when the previous token ends an operand
    /// and an operand start follows.
    fn modulo_position(&self, tokens: &[Token]) -> bool {
        let prev_is_operand = matches!(
            tokens.last().map(|t| &t.kind),
            Some(
                TokenKind::Int(_)
                    | TokenKind::Var(_)
                    | TokenKind::Ident(_)
                    | TokenKind::Str(_)
                    | TokenKind::Punct(")" | "]" | "}")
            )
        );
        if !prev_is_operand {
            return false;
        }
        let mut i = self.pos + 1;
        while let Some(c) = self.source.get(i) {
            if c.is_ascii_whitespace() {
                if *c == b'\n' {
                    return false;
                }
                i += 1;
                continue;
            }
            return c.is_ascii_alphanumeric() || *c == b'_' || *c == b'(' || *c == b'$';
        }
        false
    }

    fn lex_int(&mut self) -> ParseResult<TokenKind> {
        let mut value: i64 = 0;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            let digit = i64::from(self.bump().unwrap_or(b'0') - b'0');
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| self.error("integer literal out of range"))?;
        }
        Ok(TokenKind::Int(value))
    }

    fn lex_name(&mut self) -> ParseResult<String> {
        let start = self.pos;
        if !matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == b'_') {
            return Err(self.error("expected a name"));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        Ok(String::from_utf8_lossy(&self.source[start..self.pos]).into_owned())
    }

    fn lex_string(&mut self) -> ParseResult<TokenKind> {
        self.bump();
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(b'\n') | None => return Err(self.error("unterminated string literal")),
                Some(_) => {
                    self.bump();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        self.bump();
        Ok(TokenKind::Str(text))
    }

    fn lex_quoted(&mut self) -> ParseResult<TokenKind> {
        self.bump();
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'\'') => break,
                Some(c) if c.is_ascii_whitespace() => {
                    return Err(self.error("whitespace in quoted operator"))
                }
                None => return Err(self.error("unterminated quoted operator")),
                Some(_) => {
                    self.bump();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.source[start..self.pos]).into_owned();
        self.bump();
        if text.is_empty() {
            return Err(self.error("empty quoted operator"));
        }
        Ok(TokenKind::Quoted(text))
    }

    fn lex_punct(&mut self) -> ParseResult<TokenKind> {
        for candidate in PUNCT {
            if self.source[self.pos..].starts_with(candidate.as_bytes()) {
                for _ in 0..candidate.len() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(candidate));
            }
        }
        Err(self.error(format!(
            "unexpected character '{}'",
            char::from(self.peek().unwrap_or(b'?'))
        )))
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_rule_id: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            next_rule_id: 0,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or((1, 1), |t| (t.line, t.column));
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let kind = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if kind.is_some() {
            self.pos += 1;
        }
        kind
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Punct(p)) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{punct}'")))
        }
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Ident(s)) if s == name)
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.bump() {
            Some(TokenKind::Ident(name)) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error_here("expected an identifier"))
            }
        }
    }

    fn fresh_rule_name(&mut self) -> String {
        let name = format!("rule_{}", self.next_rule_id);
        self.next_rule_id += 1;
        name
    }

    // ------------------------------------------------------------------
    // Program structure
    // ------------------------------------------------------------------

    fn parse_program(&mut self) -> ParseResult<Program> {
        let class_name = self.parse_class_decl()?;
        let constraints = self.parse_constraint_decl()?;
        let mut rules = Vec::new();
        while self.peek().is_some() {
            rules.push(self.parse_rule()?);
        }
        Ok(Program {
            class_name,
            constraints,
            rules,
        })
    }

    fn parse_class_decl(&mut self) -> ParseResult<String> {
        if !self.at_ident("class") {
            return Err(self.error_here("expected 'class' declaration"));
        }
        self.pos += 1;
        let name = self.expect_ident()?;
        self.expect_punct(".")?;
        Ok(name)
    }

    fn parse_constraint_decl(&mut self) -> ParseResult<Vec<Signature>> {
        if !self.at_ident("constraints") {
            return Err(self.error_here("expected 'constraints' declaration"));
        }
        self.pos += 1;
        let mut signatures = vec![self.parse_signature()?];
        loop {
            if self.eat_punct(".") {
                break;
            }
            self.expect_punct(",")?;
            signatures.push(self.parse_signature()?);
        }
        Ok(signatures)
    }

    fn parse_signature(&mut self) -> ParseResult<Signature> {
        let symbol = self.expect_ident()?;
        if !symbol
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
        {
            return Err(self.error_here("constraint symbols start lowercase"));
        }
        self.expect_punct("/")?;
        match self.bump() {
            Some(TokenKind::Int(arity)) if arity >= 0 => {
                Ok(Signature::new(symbol, arity as usize))
            }
            _ => Err(self.error_here("expected an arity")),
        }
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    fn parse_rule(&mut self) -> ParseResult<Rule> {
        let name = if matches!(self.peek(), Some(TokenKind::Ident(_)))
            && matches!(self.peek_at(1), Some(TokenKind::Punct("@")))
        {
            let name = self.expect_ident()?;
            self.pos += 1;
            name
        } else {
            self.fresh_rule_name()
        };

        let first = self.parse_head_constraints()?;
        let (kept, removed) = if self.eat_punct("\\") {
            let removed = self.parse_head_constraints()?;
            self.expect_punct("<=>")?;
            (first, removed)
        } else if self.eat_punct("<=>") {
            (Vec::new(), first)
        } else if self.eat_punct("==>") {
            (first, Vec::new())
        } else {
            return Err(self.error_here("expected '\\', '<=>' or '==>'"));
        };

        let (guard, body) = self.parse_guard_and_body()?;
        self.expect_punct(".")?;

        Ok(Rule {
            name,
            kept,
            removed,
            guard,
            body,
        })
    }

    fn parse_head_constraints(&mut self) -> ParseResult<Vec<Constraint>> {
        let terms = self.parse_term_list()?;
        terms
            .into_iter()
            .map(|term| {
                Constraint::from_term(&term)
                    .ok_or_else(|| self.error_here(format!("head constraint '{term}' is not a functor")))
            })
            .collect()
    }

    fn parse_guard_and_body(&mut self) -> ParseResult<(Vec<Term>, Vec<Term>)> {
        let first = self.parse_term_list()?;
        if self.eat_punct("|") {
            let body = self.parse_term_list()?;
            Ok((first, body))
        } else {
            Ok((Vec::new(), first))
        }
    }

    fn parse_term_list(&mut self) -> ParseResult<Vec<Term>> {
        let mut terms = vec![self.parse_term()?];
        while self.eat_punct(",") {
            terms.push(self.parse_term()?);
        }
        Ok(terms)
    }

    // ------------------------------------------------------------------
    // Terms, loosest level first
    // ------------------------------------------------------------------

    fn parse_term(&mut self) -> ParseResult<Term> {
        self.parse_unification()
    }

    fn parse_binary_level<F>(
        &mut self,
        operators: &[&str],
        mut next: F,
    ) -> ParseResult<Term>
    where
        F: FnMut(&mut Self) -> ParseResult<Term>,
    {
        let mut left = next(self)?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Punct(p)) if operators.contains(p) => (*p).to_string(),
                Some(TokenKind::Ident(s)) if operators.contains(&s.as_str()) => s.clone(),
                _ => break,
            };
            self.pos += 1;
            let right = next(self)?;
            left = Term::functor(op, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_unification(&mut self) -> ParseResult<Term> {
        self.parse_binary_level(&["="], Self::parse_connective)
    }

    fn parse_connective(&mut self) -> ParseResult<Term> {
        self.parse_binary_level(&["and", "or"], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> ParseResult<Term> {
        self.parse_binary_level(&["==", "!=", "<=", "<", ">=", ">"], Self::parse_negation)
    }

    fn parse_negation(&mut self) -> ParseResult<Term> {
        if self.at_ident("not") {
            self.pos += 1;
            let operand = self.parse_additive()?;
            return Ok(Term::functor("not", vec![operand]));
        }
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> ParseResult<Term> {
        self.parse_binary_level(&["+", "-"], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Term> {
        self.parse_binary_level(&["*", "/", "%"], Self::parse_unary_minus)
    }

    fn parse_unary_minus(&mut self) -> ParseResult<Term> {
        if self.at_punct("-") {
            self.pos += 1;
            let operand = self.parse_atom()?;
            return Ok(Term::functor("-", vec![operand]));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> ParseResult<Term> {
        match self.peek().cloned() {
            Some(TokenKind::Int(n)) => {
                self.pos += 1;
                Ok(Term::Int(n))
            }
            Some(TokenKind::Str(s)) => {
                self.pos += 1;
                Ok(Term::Str(s))
            }
            Some(TokenKind::Var(name)) => {
                self.pos += 1;
                Ok(Term::Var(name))
            }
            Some(TokenKind::Ident(name)) => {
                if name == "True" || name == "False" {
                    self.pos += 1;
                    return Ok(Term::Bool(name == "True"));
                }
                if !name.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
                    return Err(self.error_here(format!("unexpected identifier '{name}'")));
                }
                self.pos += 1;
                let args = self.parse_functor_args()?;
                Ok(Term::functor(name, args))
            }
            Some(TokenKind::Quoted(op)) => {
                self.pos += 1;
                let args = self.parse_functor_args()?;
                Ok(Term::functor(op, args))
            }
            Some(TokenKind::Punct("[")) => self.parse_list(),
            Some(TokenKind::Punct("{")) => self.parse_dict(),
            Some(TokenKind::Punct("(")) => self.parse_group_or_tuple(),
            _ => Err(self.error_here("expected a term")),
        }
    }

    fn parse_functor_args(&mut self) -> ParseResult<Vec<Term>> {
        if !self.eat_punct("(") {
            return Ok(Vec::new());
        }
        let args = self.parse_term_list()?;
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_list(&mut self) -> ParseResult<Term> {
        self.expect_punct("[")?;
        if self.eat_punct("]") {
            return Ok(Term::List(Vec::new()));
        }
        let items = self.parse_term_list()?;
        self.expect_punct("]")?;
        Ok(Term::List(items))
    }

    fn parse_dict(&mut self) -> ParseResult<Term> {
        self.expect_punct("{")?;
        let mut entries = Vec::new();
        if !self.at_punct("}") {
            loop {
                let key = self.parse_term()?;
                if !key.is_ground() {
                    return Err(self.error_here(format!("dict key '{key}' is not ground")));
                }
                self.expect_punct(":")?;
                let value = self.parse_term()?;
                entries.push((key, value));
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct("}")?;
        Ok(Term::Dict(entries))
    }

    fn parse_group_or_tuple(&mut self) -> ParseResult<Term> {
        self.expect_punct("(")?;
        let first = self.parse_term()?;
        if self.eat_punct(")") {
            // Single parentheses are grouping, not a tuple.
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.parse_term()?);
        }
        self.expect_punct(")")?;
        Ok(Term::Tuple(items))
    }
}

/// Parse a complete CHR program.
pub fn parse_program(source: &str) -> ParseResult<Program> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

/// Parse a single term; used by tests and diagnostics.
pub fn parse_term(source: &str) -> ParseResult<Term> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let term = parser.parse_term()?;
    if parser.peek().is_some() {
        return Err(parser.error_here("trailing input after term"));
    }
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atomic_terms() {
        let cases = [
            ("$A", Term::var("A")),
            ("$_1", Term::var("_1")),
            ("123", Term::Int(123)),
            ("a", Term::atom("a")),
            ("b(1, 2)", Term::functor("b", vec![Term::Int(1), Term::Int(2)])),
            (
                "c(\"blub\", $A)",
                Term::functor("c", vec![Term::Str("blub".into()), Term::var("A")]),
            ),
            ("a_longer_name", Term::atom("a_longer_name")),
            ("c1", Term::atom("c1")),
            (
                "'*'(1, 2)",
                Term::functor("*", vec![Term::Int(1), Term::Int(2)]),
            ),
            ("True", Term::Bool(true)),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_term(input).unwrap(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_parse_containers() {
        assert_eq!(parse_term("[]").unwrap(), Term::List(vec![]));
        assert_eq!(
            parse_term("[1, $X]").unwrap(),
            Term::List(vec![Term::Int(1), Term::var("X")])
        );
        assert_eq!(
            parse_term("(1, 2, 3)").unwrap(),
            Term::Tuple(vec![Term::Int(1), Term::Int(2), Term::Int(3)])
        );
        // Single parentheses group.
        assert_eq!(parse_term("(1)").unwrap(), Term::Int(1));
        assert_eq!(
            parse_term("{1: $A, \"k\": 2}").unwrap(),
            Term::Dict(vec![
                (Term::Int(1), Term::var("A")),
                (Term::Str("k".into()), Term::Int(2)),
            ])
        );
    }

    #[test]
    fn test_unground_dict_key_rejected() {
        let err = parse_term("{$K: 1}").unwrap_err();
        assert!(err.message.contains("not ground"), "{err}");
    }

    #[test]
    fn test_infix_precedence() {
        assert_eq!(
            parse_term("$A + $B * $C").unwrap(),
            Term::functor(
                "+",
                vec![
                    Term::var("A"),
                    Term::functor("*", vec![Term::var("B"), Term::var("C")]),
                ]
            )
        );
        assert_eq!(
            parse_term("1 - 2 - 3").unwrap(),
            Term::functor(
                "-",
                vec![
                    Term::functor("-", vec![Term::Int(1), Term::Int(2)]),
                    Term::Int(3),
                ]
            )
        );
        assert_eq!(
            parse_term("$N == 0 and $M <= 1").unwrap(),
            Term::functor(
                "and",
                vec![
                    Term::functor("==", vec![Term::var("N"), Term::Int(0)]),
                    Term::functor("<=", vec![Term::var("M"), Term::Int(1)]),
                ]
            )
        );
        assert_eq!(
            parse_term("$X = $Y + 1").unwrap(),
            Term::functor(
                "=",
                vec![
                    Term::var("X"),
                    Term::functor("+", vec![Term::var("Y"), Term::Int(1)]),
                ]
            )
        );
        assert_eq!(
            parse_term("1 + -2").unwrap(),
            Term::functor(
                "+",
                vec![Term::Int(1), Term::functor("-", vec![Term::Int(2)])]
            )
        );
        assert_eq!(
            parse_term("5 % 3").unwrap(),
            Term::functor("%", vec![Term::Int(5), Term::Int(3)])
        );
    }

    #[test]
    fn test_parse_program_gcd() {
        let source = r"
            class GCDSolver.
            constraints gcd/1.

            r1 @ gcd($N) <=> $N == 0 | true.
            r2 @ gcd($M) \ gcd($N) <=> $M <= $N | gcd($N - $M).
        ";
        let program = parse_program(source).unwrap();
        assert_eq!(program.class_name, "GCDSolver");
        assert_eq!(program.constraints, vec![Signature::new("gcd", 1)]);
        assert_eq!(program.rules.len(), 2);

        let r1 = &program.rules[0];
        assert_eq!(r1.name, "r1");
        assert!(r1.kept.is_empty());
        assert_eq!(r1.removed[0].symbol, "gcd");
        assert_eq!(
            r1.guard,
            vec![Term::functor("==", vec![Term::var("N"), Term::Int(0)])]
        );
        assert_eq!(r1.body, vec![Term::atom("true")]);

        let r2 = &program.rules[1];
        assert_eq!(r2.kept[0].args, vec![Term::var("M")]);
        assert_eq!(r2.removed[0].args, vec![Term::var("N")]);
    }

    #[test]
    fn test_unnamed_rules_get_counter_names() {
        let source = "
            class P.
            constraints a/0, b/0.
            a <=> b.
            named @ b <=> a.
            a, b <=> a.
        ";
        let program = parse_program(source).unwrap();
        let names: Vec<&str> = program.rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["rule_0", "named", "rule_1"]);
    }

    #[test]
    fn test_propagation_and_guardless_rules() {
        let source = "
            class P.
            constraints a/0, b/0.
            t @ a ==> b.
        ";
        let program = parse_program(source).unwrap();
        let t = &program.rules[0];
        assert_eq!(t.kept[0].symbol, "a");
        assert!(t.removed.is_empty());
        assert!(t.guard.is_empty());
        assert_eq!(t.body, vec![Term::atom("b")]);
    }

    #[test]
    fn test_headless_rule_is_an_error() {
        let source = "
            class P.
            constraints a/0.
            <=> a.
        ";
        assert!(parse_program(source).is_err());
    }

    #[test]
    fn test_error_carries_position() {
        let err = parse_program("class P.\nconstraints a/0.\na <=> .\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.column > 1);
    }

    #[test]
    fn test_missing_declarations_rejected() {
        assert!(parse_program("constraints a/0.").is_err());
        assert!(parse_program("class P. a <=> b.").is_err());
    }

    #[test]
    fn test_line_comments_and_modulo() {
        let source = "
            class P.
            % a comment with gcd/1 noise
            constraints a/1.
            r @ a($N) <=> $N % 2 == 0 | a($N / 2). % trailing comment
        ";
        let program = parse_program(source).unwrap();
        assert_eq!(program.rules.len(), 1);
        assert_eq!(
            program.rules[0].guard,
            vec![Term::functor(
                "==",
                vec![
                    Term::functor("%", vec![Term::var("N"), Term::Int(2)]),
                    Term::Int(0),
                ]
            )]
        );
    }

    #[test]
    fn test_unparse_round_trip() {
        let source = r#"
            class Demo.
            constraints c/2, d/1.
            r1 @ c($X, $X) <=> d($X).
            r2 @ c($X, $Y) \ d(0) <=> $X <= $Y | c($Y, $X), d($Y - $X).
            r3 @ d($N) ==> $N == 1 | d([$N, 2]), d((1, "two")), d({1: $N}).
            d($X) <=> not $X == 2 | true.
        "#;
        let program = parse_program(source).unwrap();
        let printed = program.to_string();
        let reparsed = parse_program(&printed).unwrap();
        assert_eq!(program, reparsed);
    }
}
