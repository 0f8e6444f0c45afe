//! # Code Emitter
//!
//! Lowers a CHR program into the target IR: one procedure per rule
//! occurrence, one activation dispatcher per declared signature, one public
//! entry per declared symbol.
//!
//! ## Pipeline position
//!
//! ```text
//! Program -> normalize -> omega_r -> [Emitter] -> SolverDef -> render / interpret
//! ```
//!
//! An occurrence procedure follows the refined-semantics schema: pre-check
//! the active head's own matchings, search partners over fixed store
//! snapshots, check liveness and distinctness, evaluate matchings and guard
//! speculatively (reset on failure), consult the propagation history,
//! commit, kill removed heads, run the body, terminate.

pub mod render;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Program, Signature, Term};
use crate::ir::{
    BinOp, Const, Dispatcher, Entry, Expr, Pattern, Procedure, SolverDef, Stmt, UnaryOp,
};
use crate::normalize::{normalize_program, Matching};
use crate::occurrence::{omega_r, OccurrenceScheme};

/// Compile-time errors: undeclared heads, unknown operators, unknown
/// variables. All are fatal to compilation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("undeclared head constraint {signature} in rule '{rule}'")]
    UndeclaredHead { signature: Signature, rule: String },

    #[error("unknown operator {signature} in rule '{rule}'")]
    UnknownOperator { signature: Signature, rule: String },

    #[error("unknown variable ${name} in rule '{rule}'")]
    UnknownVariable { name: String, rule: String },

    #[error("term '{term}' cannot be used as a {position} in rule '{rule}'")]
    InvalidTerm {
        term: String,
        position: &'static str,
        rule: String,
    },
}

pub type EmitResult<T> = Result<T, EmitError>;

/// Emit the complete solver definition for a program.
pub fn emit_program(program: &Program) -> EmitResult<SolverDef> {
    Emitter::new(program).compile(program)
}

struct Emitter {
    declared: Vec<Signature>,
    /// Value locals currently in scope while compiling one occurrence.
    known: BTreeSet<String>,
    /// Head parameters of the occurrence being compiled. Patterns compare
    /// against these; any other pattern variable is existential and binds.
    head_params: BTreeSet<String>,
    next_local: usize,
    rule: String,
}

impl Emitter {
    fn new(program: &Program) -> Self {
        Emitter {
            declared: program.constraints.clone(),
            known: BTreeSet::new(),
            head_params: BTreeSet::new(),
            next_local: 0,
            rule: String::new(),
        }
    }

    fn declares(&self, signature: &Signature) -> bool {
        self.declared.contains(signature)
    }

    fn gensym(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.next_local);
        self.next_local += 1;
        name
    }

    fn compile(&mut self, program: &Program) -> EmitResult<SolverDef> {
        let normalized = normalize_program(program);
        let processed = omega_r(&normalized);

        let mut dispatchers: Vec<Dispatcher> = program
            .constraints
            .iter()
            .map(|signature| Dispatcher {
                signature: signature.clone(),
                procedures: Vec::new(),
            })
            .collect();
        let mut procedures = Vec::new();

        for rule in &processed.rules {
            for head in &rule.head {
                let signature = head.signature();
                if !self.declares(&signature) {
                    return Err(EmitError::UndeclaredHead {
                        signature,
                        rule: rule.name.clone(),
                    });
                }
            }
            for scheme in rule.occurrence_schemes() {
                let procedure = self.compile_occurrence(&scheme)?;
                debug!(rule = %rule.name, procedure = %procedure.name, "compiled occurrence");
                if let Some(dispatcher) = dispatchers
                    .iter_mut()
                    .find(|d| d.signature == procedure.signature)
                {
                    dispatcher.procedures.push(procedure.name.clone());
                }
                procedures.push(procedure);
            }
        }

        let entries = program
            .symbols()
            .into_iter()
            .map(|symbol| Entry {
                symbol: symbol.to_string(),
                arities: program.arities_of(symbol),
            })
            .collect();

        Ok(SolverDef {
            class_name: program.class_name.clone(),
            constraints: program.constraints.clone(),
            entries,
            dispatchers,
            procedures,
        })
    }

    // ------------------------------------------------------------------
    // Occurrence procedures
    // ------------------------------------------------------------------

    fn compile_occurrence(&mut self, scheme: &OccurrenceScheme<'_>) -> EmitResult<Procedure> {
        let (active_slot, active) = scheme.active;
        self.rule = scheme.rule_name.to_string();
        self.known = active.params.iter().cloned().collect();
        self.head_params = scheme.head_params();
        self.next_local = 0;

        let innermost = self.compile_innermost(scheme)?;
        let mut body = self.compile_partner_loops(&scheme.partners, innermost)?;

        // Matchings decidable from the active head alone are verified up
        // front; their speculative bindings are unwound either way, since
        // the innermost conjunction re-establishes them per candidate.
        if !scheme.partners.is_empty() {
            let prefilter = self.active_prefilter(scheme, active.params.as_slice())?;
            if let Some(mut stmts) = prefilter {
                stmts.extend(body);
                body = stmts;
            }
        }

        body.push(Stmt::Return { fired: false });

        Ok(Procedure {
            name: format!(
                "__{}_{}_{}",
                active.symbol,
                active.arity(),
                active.occurrence_idx
            ),
            signature: active.signature(),
            occurrence_idx: active.occurrence_idx,
            id_param: format!("id_{active_slot}"),
            params: active.params.clone(),
            body,
        })
    }

    fn active_prefilter(
        &mut self,
        scheme: &OccurrenceScheme<'_>,
        active_params: &[String],
    ) -> EmitResult<Option<Vec<Stmt>>> {
        let param_set: BTreeSet<&str> = active_params.iter().map(String::as_str).collect();
        let own: Vec<&Matching> = scheme
            .matching
            .iter()
            .filter(|m| {
                param_set.contains(m.var.as_str())
                    && m.pattern
                        .vars()
                        .iter()
                        .all(|v| param_set.contains(v.as_str()))
            })
            .collect();
        if own.is_empty() {
            return Ok(None);
        }
        let checks = own
            .iter()
            .map(|m| self.compile_matching(m))
            .collect::<EmitResult<Vec<Expr>>>()?;
        let flag = self.gensym("match");
        Ok(Some(vec![
            Stmt::Let {
                name: flag.clone(),
                value: Expr::conjunction(checks),
            },
            Stmt::Backtrack,
            Stmt::If {
                cond: Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(Expr::var(flag)),
                },
                then: vec![Stmt::Return { fired: false }],
                otherwise: vec![],
            },
        ]))
    }

    fn compile_partner_loops(
        &mut self,
        partners: &[(usize, &crate::occurrence::HeadConstraint)],
        innermost: Vec<Stmt>,
    ) -> EmitResult<Vec<Stmt>> {
        let Some(((slot, head), rest)) = partners.split_first() else {
            return Ok(innermost);
        };
        let body = self.compile_partner_loops(rest, innermost)?;
        Ok(vec![Stmt::PartnerLoop {
            id: format!("id_{slot}"),
            constraint: format!("c_{slot}"),
            signature: head.signature(),
            body,
        }])
    }

    fn compile_innermost(&mut self, scheme: &OccurrenceScheme<'_>) -> EmitResult<Vec<Stmt>> {
        let slots = scheme.slots();
        let ids: Vec<String> = slots.iter().map(|slot| format!("id_{slot}")).collect();

        // Partner parameters come into scope here, bound from the snapshot
        // tuples; scheme-local free variables are allocated unbound.
        let mut inner = Vec::new();
        for (slot, partner) in &scheme.partners {
            for (ix, param) in partner.params.iter().enumerate() {
                inner.push(Stmt::BindParam {
                    name: param.clone(),
                    constraint: format!("c_{slot}"),
                    index: ix,
                });
                self.known.insert(param.clone());
            }
        }
        for free in scheme.free_vars() {
            inner.push(Stmt::Fresh {
                name: free.clone(),
                value: None,
            });
            self.known.insert(free);
        }

        let mut conditions = Vec::new();
        for matching in scheme.matching {
            conditions.push(self.compile_matching(matching)?);
        }
        for guard in scheme.guard {
            conditions.push(self.compile_ask(guard)?);
        }
        conditions.push(Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expr::InHistory {
                rule: scheme.rule_name.to_string(),
                ids: ids.clone(),
            }),
        });

        let mut fired = vec![
            Stmt::AddToHistory {
                rule: scheme.rule_name.to_string(),
                ids: ids.clone(),
            },
            Stmt::Commit,
        ];
        for (slot, _) in std::iter::once(&scheme.active)
            .chain(scheme.partners.iter())
            .filter(|(_, head)| !head.kept)
        {
            fired.push(Stmt::Delete {
                id: format!("id_{slot}"),
            });
        }
        fired.extend(self.compile_body(scheme.body)?);
        if scheme.active.1.kept {
            fired.push(Stmt::If {
                cond: Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(Expr::Alive(format!("id_{}", scheme.active.0))),
                },
                then: vec![Stmt::Return { fired: true }],
                otherwise: vec![],
            });
        } else {
            fired.push(Stmt::Return { fired: true });
        }

        inner.push(Stmt::If {
            cond: Expr::conjunction(conditions),
            then: fired,
            otherwise: vec![Stmt::Backtrack],
        });

        let mut liveness: Vec<Expr> = ids.iter().map(|id| Expr::Alive(id.clone())).collect();
        if ids.len() > 1 {
            liveness.push(Expr::AllDifferent(ids));
        }

        Ok(vec![Stmt::If {
            cond: Expr::conjunction(liveness),
            then: inner,
            otherwise: vec![],
        }])
    }

    fn compile_matching(&mut self, matching: &Matching) -> EmitResult<Expr> {
        let pattern = self.compile_pattern(&matching.pattern)?;
        Ok(Expr::Match {
            subject: Box::new(Expr::var(matching.var.clone())),
            pattern: Box::new(pattern),
        })
    }

    /// Compile a lifted head pattern into a destructuring matcher. Head
    /// parameters become equality tests; other variables are existential
    /// and bind to the matched component.
    fn compile_pattern(&mut self, term: &Term) -> EmitResult<Pattern> {
        match term {
            Term::Var(name) => {
                if self.head_params.contains(name) {
                    Ok(Pattern::Equal(Box::new(Expr::var(name.clone()))))
                } else {
                    Ok(Pattern::Bind(name.clone()))
                }
            }
            Term::Int(n) => Ok(Pattern::Equal(Box::new(Expr::Const(Const::Int(*n))))),
            Term::Str(s) => Ok(Pattern::Equal(Box::new(Expr::Const(Const::Str(s.clone()))))),
            Term::Bool(b) => Ok(Pattern::Equal(Box::new(Expr::Const(Const::Bool(*b))))),
            Term::List(items) => Ok(Pattern::List(
                items
                    .iter()
                    .map(|item| self.compile_pattern(item))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Tuple(items) => Ok(Pattern::Tuple(
                items
                    .iter()
                    .map(|item| self.compile_pattern(item))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Dict(entries) => Ok(Pattern::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.compile_value(k)?, self.compile_pattern(v)?)))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Functor { symbol, args } => Err(EmitError::UnknownOperator {
                signature: Signature::new(symbol.clone(), args.len()),
                rule: self.rule.clone(),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Guards and body built-ins
    // ------------------------------------------------------------------

    /// Compile a guard item into an ask expression: a short-circuit check
    /// that may bind speculatively (`=`, `is`) but is always committed or
    /// reset by the surrounding conjunction handler.
    fn compile_ask(&mut self, term: &Term) -> EmitResult<Expr> {
        let Term::Functor { symbol, args } = term else {
            return Err(EmitError::InvalidTerm {
                term: term.to_string(),
                position: "guard check",
                rule: self.rule.clone(),
            });
        };
        match (symbol.as_str(), args.len()) {
            ("true", 0) => Ok(Expr::bool(true)),
            ("false", 0) => Ok(Expr::bool(false)),
            ("=" | "is", 2) => Ok(Expr::unify(
                self.compile_value(&args[0])?,
                self.compile_value(&args[1])?,
            )),
            ("not", 1) => Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.compile_ask(&args[0])?),
            }),
            ("and" | "or", 2) => {
                let op = if symbol == "and" { BinOp::And } else { BinOp::Or };
                Ok(Expr::binary(
                    op,
                    self.compile_ask(&args[0])?,
                    self.compile_ask(&args[1])?,
                ))
            }
            ("is_bound", 1) => Ok(Expr::IsBound(Box::new(self.compile_value(&args[0])?))),
            ("==" | "!=" | "<" | "<=" | ">" | ">=", 2) => {
                let op = BinOp::from_surface(symbol).unwrap_or(BinOp::Eq);
                Ok(Expr::binary(
                    op,
                    self.compile_value(&args[0])?,
                    self.compile_value(&args[1])?,
                ))
            }
            _ => Err(EmitError::UnknownOperator {
                signature: Signature::new(symbol.clone(), args.len()),
                rule: self.rule.clone(),
            }),
        }
    }

    /// Compile a term in value position: variables, constants, containers,
    /// and operator applications that evaluate to a value.
    fn compile_value(&mut self, term: &Term) -> EmitResult<Expr> {
        match term {
            Term::Var(name) => {
                if self.known.contains(name) {
                    Ok(Expr::var(name.clone()))
                } else {
                    Err(EmitError::UnknownVariable {
                        name: name.clone(),
                        rule: self.rule.clone(),
                    })
                }
            }
            Term::Int(n) => Ok(Expr::Const(Const::Int(*n))),
            Term::Str(s) => Ok(Expr::Const(Const::Str(s.clone()))),
            Term::Bool(b) => Ok(Expr::Const(Const::Bool(*b))),
            Term::List(items) => Ok(Expr::List(
                items
                    .iter()
                    .map(|item| self.compile_value(item))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Tuple(items) => Ok(Expr::Tuple(
                items
                    .iter()
                    .map(|item| self.compile_value(item))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Dict(entries) => Ok(Expr::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.compile_value(k)?, self.compile_value(v)?)))
                    .collect::<EmitResult<_>>()?,
            )),
            Term::Functor { symbol, args } => match (symbol.as_str(), args.len()) {
                ("-", 1) => Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(self.compile_value(&args[0])?),
                }),
                ("not", 1) => Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(self.compile_value(&args[0])?),
                }),
                (op, 2) if BinOp::from_surface(op).is_some() => {
                    let op = BinOp::from_surface(op).unwrap_or(BinOp::Add);
                    Ok(Expr::binary(
                        op,
                        self.compile_value(&args[0])?,
                        self.compile_value(&args[1])?,
                    ))
                }
                _ => Err(EmitError::UnknownOperator {
                    signature: Signature::new(symbol.clone(), args.len()),
                    rule: self.rule.clone(),
                }),
            },
        }
    }

    // ------------------------------------------------------------------
    // Rule bodies
    // ------------------------------------------------------------------

    fn compile_body(&mut self, body: &[Term]) -> EmitResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        for item in body {
            self.compile_body_item(item, &mut stmts)?;
        }
        Ok(stmts)
    }

    fn compile_body_item(&mut self, item: &Term, stmts: &mut Vec<Stmt>) -> EmitResult<()> {
        let Term::Functor { symbol, args } = item else {
            return Err(EmitError::InvalidTerm {
                term: item.to_string(),
                position: "body constraint",
                rule: self.rule.clone(),
            });
        };
        let signature = Signature::new(symbol.clone(), args.len());

        if symbol == "true" && args.is_empty() {
            return Ok(());
        }

        if symbol == "false" {
            let messages = args
                .iter()
                .map(|arg| self.compile_value(arg))
                .collect::<EmitResult<Vec<Expr>>>()?;
            stmts.push(Stmt::Fail { messages });
            return Ok(());
        }

        if self.declares(&signature) {
            // A user CHR constraint: allocate, insert, activate.
            let mut vars = Vec::new();
            for arg in args {
                match arg {
                    Term::Var(name) if self.known.contains(name) => vars.push(name.clone()),
                    other => {
                        let value = self.compile_value(other)?;
                        let local = self.gensym("local");
                        stmts.push(Stmt::Fresh {
                            name: local.clone(),
                            value: Some(value),
                        });
                        self.known.insert(local.clone());
                        vars.push(local);
                    }
                }
            }
            let id = self.gensym("fresh_id");
            stmts.push(Stmt::NewId { name: id.clone() });
            stmts.push(Stmt::Insert {
                id: id.clone(),
                signature: signature.clone(),
                args: vars.iter().map(|v| Expr::var(v.clone())).collect(),
            });
            stmts.push(Stmt::Activate {
                signature,
                id,
                args: vars,
            });
            return Ok(());
        }

        match self.compile_ask(item) {
            Ok(ask) => {
                // A builtin in the body: failure is fatal. Tells publish
                // their bindings immediately, before anything can observe
                // or unwind them.
                let culprits = args
                    .iter()
                    .filter_map(|arg| self.compile_value(arg).ok())
                    .collect();
                stmts.push(Stmt::Tell {
                    ask,
                    context: signature.to_string(),
                    culprits,
                });
                stmts.push(Stmt::Commit);
                Ok(())
            }
            Err(EmitError::UnknownOperator { .. }) => {
                // Not declared, not a builtin: defer to runtime, where the
                // distinction between a wrong arity and a missing symbol
                // surfaces as UndefinedConstraint.
                stmts.push(Stmt::Undefined {
                    symbol: symbol.clone(),
                    arity: args.len(),
                });
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn gcd_source() -> &'static str {
        r"
        class GCDSolver.
        constraints gcd/1.
        r1 @ gcd($N) <=> $N == 0 | true.
        r2 @ gcd($M) \ gcd($N) <=> $M <= $N | gcd($N - $M).
        "
    }

    #[test]
    fn test_emit_gcd_structure() {
        let program = parse_program(gcd_source()).unwrap();
        let solver = emit_program(&program).unwrap();

        assert_eq!(solver.class_name, "GCDSolver");
        assert_eq!(solver.entries.len(), 1);
        assert_eq!(solver.entries[0].symbol, "gcd");
        assert_eq!(solver.entries[0].arities, vec![1]);

        let dispatcher = solver.dispatcher(&Signature::new("gcd", 1)).unwrap();
        assert_eq!(
            dispatcher.procedures,
            vec!["__gcd_1_0", "__gcd_1_1", "__gcd_1_2"]
        );

        // Occurrence 1 is r2's removed head, occurrence 2 its kept head.
        let removed = solver.procedure("__gcd_1_1").unwrap();
        assert_eq!(removed.id_param, "id_0");
        assert_eq!(removed.params, vec!["N"]);
        let kept = solver.procedure("__gcd_1_2").unwrap();
        assert_eq!(kept.id_param, "id_1");
        assert_eq!(kept.params, vec!["M"]);
    }

    #[test]
    fn test_single_headed_occurrence_shape() {
        let program = parse_program(gcd_source()).unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__gcd_1_0").unwrap();

        // if alive(id_0) { if guard && !history { ... } else backtrack }
        // return false
        let Stmt::If { cond, then, .. } = &proc.body[0] else {
            panic!("expected liveness check, got {:?}", proc.body[0]);
        };
        assert_eq!(cond, &Expr::Alive("id_0".into()));
        let Stmt::If { then: fired, otherwise, .. } = &then[0] else {
            panic!("expected guard check");
        };
        assert_eq!(otherwise, &vec![Stmt::Backtrack]);
        assert!(matches!(fired[0], Stmt::AddToHistory { .. }));
        assert!(matches!(fired[1], Stmt::Commit));
        assert!(matches!(fired[2], Stmt::Delete { .. }));
        assert_eq!(fired.last(), Some(&Stmt::Return { fired: true }));
        assert_eq!(proc.body.last(), Some(&Stmt::Return { fired: false }));
    }

    #[test]
    fn test_partner_loop_uses_fixed_snapshot() {
        let program = parse_program(gcd_source()).unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__gcd_1_1").unwrap();

        let Stmt::PartnerLoop { id, constraint, signature, body } = &proc.body[0] else {
            panic!("expected partner loop, got {:?}", proc.body[0]);
        };
        assert_eq!(id, "id_1");
        assert_eq!(constraint, "c_1");
        assert_eq!(signature, &Signature::new("gcd", 1));

        // Innermost: liveness + distinctness, then partner binds.
        let Stmt::If { cond, then, .. } = &body[0] else {
            panic!("expected liveness check");
        };
        let printed = format!("{cond:?}");
        assert!(printed.contains("AllDifferent"));
        assert!(matches!(
            &then[0],
            Stmt::BindParam { name, constraint, index: 0 }
                if name == "M" && constraint == "c_1"
        ));
    }

    #[test]
    fn test_body_chr_constraint_inserts_and_activates() {
        let program = parse_program(gcd_source()).unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__gcd_1_1").unwrap();
        let printed = format!("{:?}", proc.body);
        assert!(printed.contains("NewId"));
        assert!(printed.contains("Activate"));
        // The body argument `$N - $M` lands in a fresh local.
        assert!(printed.contains("Fresh"));
    }

    #[test]
    fn test_pattern_head_becomes_matching() {
        let program = parse_program(
            "class P. constraints gcd/1. r @ gcd(0) <=> true.",
        )
        .unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__gcd_1_0").unwrap();
        assert_eq!(proc.params, vec!["_0"]);
        let printed = format!("{:?}", proc.body);
        assert!(printed.contains("Match"));
        assert!(printed.contains("Equal(Const(Int(0)))"));
    }

    #[test]
    fn test_undeclared_head_is_an_error() {
        let program = parse_program("class P. constraints a/0. r @ b <=> a.").unwrap();
        assert_eq!(
            emit_program(&program),
            Err(EmitError::UndeclaredHead {
                signature: Signature::new("b", 0),
                rule: "r".into(),
            })
        );
    }

    #[test]
    fn test_undeclared_body_symbol_defers_to_runtime() {
        let program =
            parse_program("class P. constraints a/0. r @ a <=> b(1).").unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__a_0_0").unwrap();
        let printed = format!("{:?}", proc.body);
        assert!(printed.contains("Undefined"));
    }

    #[test]
    fn test_unknown_guard_operator_is_an_error() {
        let program =
            parse_program("class P. constraints a/1. r @ a($X) <=> frob($X) | true.").unwrap();
        assert!(matches!(
            emit_program(&program),
            Err(EmitError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_body_tell_commits_immediately() {
        let program = parse_program(
            "class Leq. constraints leq/2. anti @ leq($X, $Y), leq($Y, $X) <=> $X = $Y.",
        )
        .unwrap();
        let solver = emit_program(&program).unwrap();
        let proc = solver.procedure("__leq_2_0").unwrap();
        let printed = format!("{:?}", proc.body);
        let tell_pos = printed.find("Tell").expect("body tell emitted");
        let commit_after = printed[tell_pos..].contains("Commit");
        assert!(commit_after);
    }
}
