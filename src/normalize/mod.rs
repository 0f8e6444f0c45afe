//! # Normalizer
//!
//! Linearizes rule heads: after normalization every head argument is a
//! distinct variable name, and every repeated variable or non-variable
//! pattern has been lifted into an explicit matching constraint
//! `match(fresh, original)` that the emitter compiles into runtime checks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ast::{Program, Rule, Signature, Term};

/// An equality lifted out of a head pattern: the fresh head parameter on the
/// left, the original pattern term on the right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matching {
    pub var: String,
    pub pattern: Term,
}

/// A head constraint after linearization: every parameter is a plain,
/// distinct variable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedHead {
    pub symbol: String,
    pub params: Vec<String>,
}

impl NormalizedHead {
    pub fn signature(&self) -> Signature {
        Signature::new(self.symbol.clone(), self.params.len())
    }
}

/// A rule whose head pattern matching has been reduced to name binding plus
/// an explicit matching list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRule {
    pub name: String,
    pub kept: Vec<NormalizedHead>,
    pub removed: Vec<NormalizedHead>,
    pub matching: Vec<Matching>,
    pub guard: Vec<Term>,
    pub body: Vec<Term>,
}

/// A program with all rules normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedProgram {
    pub class_name: String,
    pub constraints: Vec<Signature>,
    pub rules: Vec<NormalizedRule>,
}

/// Normalize one rule. Heads are scanned left-to-right, kept before
/// removed, tracking the set of variable names already bound.
pub fn normalize_rule(rule: &Rule) -> NormalizedRule {
    let mut known: BTreeSet<String> = BTreeSet::new();
    let mut matching = Vec::new();
    let mut next_fresh = 0usize;

    let mut fresh_name = |known: &BTreeSet<String>| loop {
        let candidate = format!("_{next_fresh}");
        next_fresh += 1;
        if !known.contains(&candidate) {
            return candidate;
        }
    };

    let mut normalize_heads = |heads: &[crate::ast::Constraint],
                               known: &mut BTreeSet<String>,
                               matching: &mut Vec<Matching>| {
        heads
            .iter()
            .map(|head| {
                let params = head
                    .args
                    .iter()
                    .map(|arg| match arg {
                        Term::Var(name) if !known.contains(name) => {
                            known.insert(name.clone());
                            name.clone()
                        }
                        pattern => {
                            let fresh = fresh_name(known);
                            known.insert(fresh.clone());
                            matching.push(Matching {
                                var: fresh.clone(),
                                pattern: pattern.clone(),
                            });
                            fresh
                        }
                    })
                    .collect();
                NormalizedHead {
                    symbol: head.symbol.clone(),
                    params,
                }
            })
            .collect::<Vec<_>>()
    };

    let kept = normalize_heads(&rule.kept, &mut known, &mut matching);
    let removed = normalize_heads(&rule.removed, &mut known, &mut matching);

    NormalizedRule {
        name: rule.name.clone(),
        kept,
        removed,
        matching,
        guard: rule.guard.clone(),
        body: rule
            .body
            .iter()
            .filter(|item| !matches!(item, Term::Functor { symbol, args } if symbol == "true" && args.is_empty()))
            .cloned()
            .collect(),
    }
}

/// Normalize every rule of a program.
pub fn normalize_program(program: &Program) -> NormalizedProgram {
    NormalizedProgram {
        class_name: program.class_name.clone(),
        constraints: program.constraints.clone(),
        rules: program.rules.iter().map(normalize_rule).collect(),
    }
}
